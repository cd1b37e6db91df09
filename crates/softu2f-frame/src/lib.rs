//! U2FHID framing for the softu2f device.
//!
//! Logical messages travel as a sequence of fixed 64-byte frames:
//! - one INIT frame: 4-byte channel id, command byte (high bit set),
//!   2-byte big-endian length, 57 payload bytes
//! - zero or more CONT frames: 4-byte channel id, 7-bit sequence,
//!   59 payload bytes
//!
//! [`Reassembler`] turns inbound frames back into [`Message`]s and
//! [`MessageWriter`] splits outbound messages into frames.

pub mod codec;
pub mod command;
pub mod error;
pub mod message;
pub mod reader;
#[cfg(feature = "async")]
pub mod report_codec;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameBody, CONT_DATA_SIZE, FRAME_SIZE, INIT_DATA_SIZE,
    MAX_MESSAGE_SIZE,
};
pub use command::{
    command_name, error_name, CAPFLAG_WINK, CID_BROADCAST, INIT_NONCE_SIZE, U2FHID_ERROR,
    U2FHID_IF_VERSION, U2FHID_INIT, U2FHID_LOCK, U2FHID_MSG, U2FHID_PING, U2FHID_SYNC,
    U2FHID_WINK,
};
pub use error::{FrameError, Result};
pub use message::Message;
pub use reader::{Assembly, Reassembler, Rejection};
#[cfg(feature = "async")]
pub use report_codec::ReportCodec;
pub use writer::{fragment, Fragments, MessageWriter, DEFAULT_FRAME_PACING};
