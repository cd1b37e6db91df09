use bytes::Bytes;

use crate::codec::{Frame, FrameBody, CONT_DATA_SIZE, INIT_DATA_SIZE, MAX_MESSAGE_SIZE};
use crate::command::errors::{ERR_CHANNEL_BUSY, ERR_INVALID_LEN, ERR_INVALID_SEQ};
use crate::command::{command_name, U2FHID_SYNC};
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Outcome of feeding one frame to a [`Reassembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// The frame was absorbed; more frames are needed.
    Incomplete,
    /// The frame completed a message. The slot is free again.
    Complete(Message),
    /// The frame was refused. See [`Rejection::error_code`] for the reply.
    Rejected(Rejection),
    /// A SYNC on the in-flight channel discarded the partial message.
    Cancelled { cid: u32, nonce: u8 },
}

/// Why a frame was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// An INIT arrived while another message was still being assembled.
    #[error("INIT on channel {cid:#010x} while channel {active_cid:#010x} is mid-message")]
    InitOutOfOrder { cid: u32, active_cid: u32 },

    /// An INIT announced more than a message can hold.
    #[error("INIT on channel {cid:#010x} declares {len} bytes (max {max})", max = MAX_MESSAGE_SIZE)]
    LengthTooLarge { cid: u32, len: usize },

    /// A CONT arrived with nothing in flight.
    #[error("CONT on channel {cid:#010x} with no message in flight")]
    ContWithoutInit { cid: u32 },

    /// A CONT arrived for a channel other than the in-flight one.
    #[error("spurious CONT on channel {cid:#010x} while channel {active_cid:#010x} is mid-message")]
    SpuriousCont { cid: u32, active_cid: u32 },

    /// A CONT carried the wrong sequence number. The partial message is gone.
    #[error("CONT on channel {cid:#010x} has sequence {got}, expected {expected}")]
    InvalidSequence { cid: u32, expected: u8, got: u8 },
}

impl Rejection {
    /// Channel of the refused frame, which is where any reply goes.
    pub fn cid(&self) -> u32 {
        match self {
            Rejection::InitOutOfOrder { cid, .. }
            | Rejection::LengthTooLarge { cid, .. }
            | Rejection::ContWithoutInit { cid }
            | Rejection::SpuriousCont { cid, .. }
            | Rejection::InvalidSequence { cid, .. } => *cid,
        }
    }

    /// Error code to send back, if the host should hear about it at all.
    pub fn error_code(&self) -> Option<u8> {
        match self {
            Rejection::InitOutOfOrder { .. } => Some(ERR_CHANNEL_BUSY),
            Rejection::LengthTooLarge { .. } => Some(ERR_INVALID_LEN),
            Rejection::InvalidSequence { .. } => Some(ERR_INVALID_SEQ),
            Rejection::ContWithoutInit { .. } | Rejection::SpuriousCont { .. } => None,
        }
    }

    /// True when the rejection discarded the in-flight message.
    pub fn aborts(&self) -> bool {
        matches!(self, Rejection::InvalidSequence { .. })
    }
}

#[derive(Debug)]
struct Partial {
    cid: u32,
    cmd: u8,
    declared: usize,
    buf: Vec<u8>,
    next_seq: u8,
}

impl Partial {
    fn is_complete(&self) -> bool {
        self.buf.len() >= self.declared
    }

    fn append(&mut self, data: &[u8], capacity: usize) {
        let remaining = self.declared.saturating_sub(self.buf.len());
        let take = remaining.min(capacity).min(data.len());
        self.buf.extend_from_slice(&data[..take]);
    }

    fn into_message(self) -> Message {
        Message {
            cid: self.cid,
            cmd: self.cmd,
            payload: Bytes::from(self.buf),
        }
    }
}

/// Rebuilds logical messages from inbound frames.
///
/// Holds at most one partial message for the whole device, whatever the
/// channel. Purely a state machine: it never touches a transport, and the
/// caller decides what to send for a [`Rejection`].
#[derive(Debug, Default)]
pub struct Reassembler {
    partial: Option<Partial>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel of the in-flight message, if any.
    pub fn in_flight(&self) -> Option<u32> {
        self.partial.as_ref().map(|p| p.cid)
    }

    /// True when `frame` is a SYNC that would cancel the in-flight message.
    ///
    /// Such frames bypass the channel lock gate.
    pub fn cancels(&self, frame: &Frame) -> bool {
        matches!(
            (&frame.body, self.in_flight()),
            (FrameBody::Init { cmd: U2FHID_SYNC, .. }, Some(active)) if active == frame.cid
        )
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        if let Some(partial) = self.partial.take() {
            tracing::debug!(
                cid = format_args!("{:#010x}", partial.cid),
                received = partial.buf.len(),
                declared = partial.declared,
                "discarding partial message"
            );
        }
    }

    /// Feed one frame.
    ///
    /// Only allocation failure is an `Err`; protocol violations come back as
    /// [`Assembly::Rejected`] so the caller can answer on the wire.
    pub fn accept(&mut self, frame: Frame) -> Result<Assembly> {
        if self.cancels(&frame) {
            self.partial = None;
            let nonce = frame.data().first().copied().unwrap_or(0);
            return Ok(Assembly::Cancelled {
                cid: frame.cid,
                nonce,
            });
        }

        let cid = frame.cid;
        match frame.body {
            FrameBody::Init { cmd, bcnt, data } => self.start(cid, cmd, bcnt, &data),
            FrameBody::Cont { seq, data } => Ok(self.continue_with(cid, seq, &data)),
        }
    }

    fn start(&mut self, cid: u32, cmd: u8, bcnt: u16, data: &[u8]) -> Result<Assembly> {
        if let Some(active) = &self.partial {
            return Ok(Assembly::Rejected(Rejection::InitOutOfOrder {
                cid,
                active_cid: active.cid,
            }));
        }

        let declared = usize::from(bcnt);
        if declared > MAX_MESSAGE_SIZE {
            return Ok(Assembly::Rejected(Rejection::LengthTooLarge {
                cid,
                len: declared,
            }));
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(declared)
            .map_err(|_| FrameError::Allocation { size: declared })?;

        tracing::trace!(
            cid = format_args!("{cid:#010x}"),
            cmd = command_name(cmd),
            declared,
            "message started"
        );

        let mut partial = Partial {
            cid,
            cmd,
            declared,
            buf,
            next_seq: 0,
        };
        partial.append(data, INIT_DATA_SIZE);
        Ok(self.finish_or_park(partial))
    }

    fn continue_with(&mut self, cid: u32, seq: u8, data: &[u8]) -> Assembly {
        let Some(partial) = self.partial.as_mut() else {
            return Assembly::Rejected(Rejection::ContWithoutInit { cid });
        };
        if partial.cid != cid {
            return Assembly::Rejected(Rejection::SpuriousCont {
                cid,
                active_cid: partial.cid,
            });
        }
        if partial.next_seq != seq {
            let expected = partial.next_seq;
            self.partial = None;
            return Assembly::Rejected(Rejection::InvalidSequence {
                cid,
                expected,
                got: seq,
            });
        }

        partial.append(data, CONT_DATA_SIZE);
        partial.next_seq = partial.next_seq.wrapping_add(1);

        match self.partial.take() {
            Some(partial) => self.finish_or_park(partial),
            None => Assembly::Incomplete,
        }
    }

    fn finish_or_park(&mut self, partial: Partial) -> Assembly {
        if partial.is_complete() {
            let message = partial.into_message();
            tracing::debug!(
                cid = format_args!("{:#010x}", message.cid),
                cmd = message.command_name(),
                len = message.len(),
                "message complete"
            );
            Assembly::Complete(message)
        } else {
            self.partial = Some(partial);
            Assembly::Incomplete
        }
    }
}
