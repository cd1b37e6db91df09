use softu2f_transport::error::TransportError;

/// Errors that can occur during frame encoding, decoding and reassembly.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A raw report was not exactly one frame long.
    #[error("malformed frame ({len} bytes, expected 64)")]
    MalformedFrame { len: usize },

    /// Frame data exceeds what a single INIT or CONT frame can carry.
    #[error("frame payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A logical message exceeds the U2FHID maximum.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A CONT sequence number does not fit in seven bits.
    #[error("sequence number {0} out of range (max 127)")]
    SequenceOverflow(u8),

    /// The reassembly buffer for an announced message could not be allocated.
    #[error("could not allocate {size} bytes for message reassembly")]
    Allocation { size: usize },

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl FrameError {
    /// True when the error came from the link itself rather than the data on it.
    pub fn is_transport(&self) -> bool {
        matches!(self, FrameError::Transport(_))
    }
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        FrameError::Transport(TransportError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
