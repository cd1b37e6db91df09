use bytes::Bytes;

use crate::command::{command_name, TYPE_INIT, U2FHID_ERROR};

/// A complete logical U2FHID message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel the message travels on.
    pub cid: u32,
    /// Command byte, INIT bit included.
    pub cmd: u8,
    /// Message payload. Its length is the declared length on the wire.
    pub payload: Bytes,
}

impl Message {
    pub fn new(cid: u32, cmd: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            cid,
            cmd: cmd | TYPE_INIT,
            payload: payload.into(),
        }
    }

    /// A one-byte ERROR message carrying `code`.
    pub fn error(cid: u32, code: u8) -> Self {
        Self::new(cid, U2FHID_ERROR, vec![code])
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Human-readable command name.
    pub fn command_name(&self) -> &'static str {
        command_name(self.cmd)
    }

    /// The error code when this is an ERROR message.
    pub fn error_code(&self) -> Option<u8> {
        if self.cmd == U2FHID_ERROR {
            self.payload.first().copied()
        } else {
            None
        }
    }
}
