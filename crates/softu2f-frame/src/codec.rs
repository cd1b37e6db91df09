use bytes::{BufMut, Bytes, BytesMut};
use softu2f_transport::{Report, REPORT_SIZE};

use crate::command::TYPE_INIT;
use crate::error::{FrameError, Result};

/// Size of one U2FHID frame on the wire.
pub const FRAME_SIZE: usize = REPORT_SIZE;

/// Data bytes carried by an INIT frame: 64 - cid(4) - cmd(1) - bcnt(2).
pub const INIT_DATA_SIZE: usize = FRAME_SIZE - 7;

/// Data bytes carried by a CONT frame: 64 - cid(4) - seq(1).
pub const CONT_DATA_SIZE: usize = FRAME_SIZE - 5;

/// Highest CONT sequence number.
pub const MAX_SEQ: u8 = 0x7f;

/// Largest logical message: one INIT frame plus 128 CONT frames.
pub const MAX_MESSAGE_SIZE: usize = INIT_DATA_SIZE + (MAX_SEQ as usize + 1) * CONT_DATA_SIZE;

/// One 64-byte U2FHID frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Channel id, big-endian on the wire.
    pub cid: u32,
    /// INIT or CONT body.
    pub body: FrameBody,
}

/// The two frame shapes, told apart by the high bit of byte 4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    /// First frame of a message.
    Init {
        /// Command byte, high bit set.
        cmd: u8,
        /// Total payload length of the whole message.
        bcnt: u16,
        /// Up to [`INIT_DATA_SIZE`] bytes. Decoded frames carry the full
        /// capacity, padding included.
        data: Bytes,
    },
    /// Continuation frame.
    Cont {
        /// Sequence number, 0..=127.
        seq: u8,
        /// Up to [`CONT_DATA_SIZE`] bytes.
        data: Bytes,
    },
}

impl Frame {
    /// Build an INIT frame.
    pub fn init(cid: u32, cmd: u8, bcnt: u16, data: impl Into<Bytes>) -> Self {
        Self {
            cid,
            body: FrameBody::Init {
                cmd: cmd | TYPE_INIT,
                bcnt,
                data: data.into(),
            },
        }
    }

    /// Build a CONT frame.
    pub fn cont(cid: u32, seq: u8, data: impl Into<Bytes>) -> Self {
        Self {
            cid,
            body: FrameBody::Cont {
                seq,
                data: data.into(),
            },
        }
    }

    pub fn is_init(&self) -> bool {
        matches!(self.body, FrameBody::Init { .. })
    }

    /// Data bytes carried by this frame.
    pub fn data(&self) -> &Bytes {
        match &self.body {
            FrameBody::Init { data, .. } | FrameBody::Cont { data, .. } => data,
        }
    }

    /// Encode into a fixed-size report, zero-padding unused data bytes.
    pub fn to_report(&self) -> Result<Report> {
        let mut report = [0u8; FRAME_SIZE];
        report[..4].copy_from_slice(&self.cid.to_be_bytes());
        match &self.body {
            FrameBody::Init { cmd, bcnt, data } => {
                check_data(data.len(), INIT_DATA_SIZE)?;
                report[4] = cmd | TYPE_INIT;
                report[5..7].copy_from_slice(&bcnt.to_be_bytes());
                report[7..7 + data.len()].copy_from_slice(data);
            }
            FrameBody::Cont { seq, data } => {
                if *seq > MAX_SEQ {
                    return Err(FrameError::SequenceOverflow(*seq));
                }
                check_data(data.len(), CONT_DATA_SIZE)?;
                report[4] = *seq;
                report[5..5 + data.len()].copy_from_slice(data);
            }
        }
        Ok(report)
    }
}

fn check_data(size: usize, max: usize) -> Result<()> {
    if size > max {
        return Err(FrameError::PayloadTooLarge { size, max });
    }
    Ok(())
}

/// Encode a frame onto the end of `dst`.
///
/// Wire format:
/// ```text
/// INIT: | CID (4B BE) | CMD|0x80 (1B) | BCNT (2B BE) | DATA (57B) |
/// CONT: | CID (4B BE) | SEQ (1B)     | DATA (59B)                 |
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let report = frame.to_report()?;
    dst.reserve(FRAME_SIZE);
    dst.put_slice(&report);
    Ok(())
}

/// Decode one raw report.
///
/// Anything other than exactly [`FRAME_SIZE`] bytes is malformed. The high
/// bit of byte 4 selects the frame type, so every 64-byte report decodes.
pub fn decode_frame(raw: &Bytes) -> Result<Frame> {
    if raw.len() != FRAME_SIZE {
        return Err(FrameError::MalformedFrame { len: raw.len() });
    }
    let cid = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let tag = raw[4];
    let body = if tag & TYPE_INIT != 0 {
        FrameBody::Init {
            cmd: tag,
            bcnt: u16::from_be_bytes([raw[5], raw[6]]),
            data: raw.slice(7..),
        }
    } else {
        FrameBody::Cont {
            seq: tag,
            data: raw.slice(5..),
        }
    };
    Ok(Frame { cid, body })
}
