use std::time::Duration;

use softu2f_frame::{command_name, error_name, FrameError};
use softu2f_transport::TransportError;

/// Errors that can occur in device and host-client operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// No handler, built-in or registered, for this command.
    #[error("unsupported command {0:#04x} ({name})", name = cmd_label(.0))]
    UnsupportedCommand(u8),

    /// A command payload had the wrong length.
    #[error("{name} payload has invalid length {len}", name = cmd_label(.cmd))]
    InvalidLength { cmd: u8, len: usize },

    /// Handlers may only be registered for built-in or vendor commands.
    #[error("cannot register a handler for command {0:#04x}")]
    InvalidRegistration(u8),

    /// A registered handler failed.
    #[error("handler failed: {0}")]
    Handler(String),

    /// The device answered with an ERROR message.
    #[error("device returned error {code:#04x} ({name})", name = code_label(.code))]
    Remote { code: u8 },

    /// No response arrived in time.
    #[error("no response after {0:?}")]
    Timeout(Duration),

    /// A response arrived that does not match the request.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid device configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeviceError {
    /// True when the link itself is gone and the run loop must stop.
    ///
    /// Protocol and handler errors only affect the current message.
    pub fn is_fatal(&self) -> bool {
        match self {
            DeviceError::Transport(_) => true,
            DeviceError::Frame(err) => err.is_transport(),
            _ => false,
        }
    }

    /// Wrap any displayable error as a handler failure.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        DeviceError::Handler(err.to_string())
    }
}

fn cmd_label(cmd: &u8) -> &'static str {
    command_name(*cmd)
}

fn code_label(code: &u8) -> &'static str {
    error_name(*code)
}

pub type Result<T> = std::result::Result<T, DeviceError>;
