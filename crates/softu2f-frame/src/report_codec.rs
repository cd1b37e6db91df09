//! `tokio_util` codec for a byte stream of back-to-back 64-byte reports.
//!
//! Lets async hosts drive a U2FHID link through `Framed`, `FramedRead` or
//! `FramedWrite`. Message reassembly stays with [`crate::Reassembler`].

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Frame, FRAME_SIZE};
use crate::error::FrameError;

/// Splits a byte stream into [`Frame`]s and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportCodec;

impl ReportCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for ReportCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.len() < FRAME_SIZE {
            src.reserve(FRAME_SIZE - src.len());
            return Ok(None);
        }
        let raw = src.split_to(FRAME_SIZE).freeze();
        decode_frame(&raw).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                let len = src.len();
                src.advance(len);
                Err(FrameError::MalformedFrame { len })
            }
        }
    }
}

impl Encoder<Frame> for ReportCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(&frame, dst)
    }
}
