use std::time::Duration;

use bytes::Bytes;
use softu2f_transport::FrameTransport;

use crate::codec::{Frame, CONT_DATA_SIZE, INIT_DATA_SIZE, MAX_MESSAGE_SIZE};
use crate::command::command_name;
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Delay between consecutive outbound frames.
///
/// Some host stacks drop reports that arrive back to back.
pub const DEFAULT_FRAME_PACING: Duration = Duration::from_millis(5);

/// Split a message into its INIT frame followed by CONT frames.
///
/// Fails with [`FrameError::MessageTooLarge`] when the payload cannot be
/// carried by one INIT and 128 CONT frames.
pub fn fragment(message: &Message) -> Result<Fragments> {
    let size = message.payload.len();
    if size > MAX_MESSAGE_SIZE {
        return Err(FrameError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(Fragments {
        cid: message.cid,
        cmd: message.cmd,
        payload: message.payload.clone(),
        offset: 0,
        next_seq: None,
    })
}

/// Iterator over the frames of one outbound message.
#[derive(Debug, Clone)]
pub struct Fragments {
    cid: u32,
    cmd: u8,
    payload: Bytes,
    offset: usize,
    // None until the INIT frame has been produced.
    next_seq: Option<u8>,
}

impl Iterator for Fragments {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let len = self.payload.len();
        match self.next_seq {
            None => {
                let end = len.min(INIT_DATA_SIZE);
                self.offset = end;
                self.next_seq = Some(0);
                // Length was checked in `fragment`, so it fits in 16 bits.
                let bcnt = len as u16;
                Some(Frame::init(
                    self.cid,
                    self.cmd,
                    bcnt,
                    self.payload.slice(..end),
                ))
            }
            Some(seq) if self.offset < len => {
                let end = (self.offset + CONT_DATA_SIZE).min(len);
                let data = self.payload.slice(self.offset..end);
                self.offset = end;
                self.next_seq = Some(seq.wrapping_add(1));
                Some(Frame::cont(self.cid, seq, data))
            }
            Some(_) => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining_cont = self
            .payload
            .len()
            .saturating_sub(self.offset.max(INIT_DATA_SIZE.min(self.payload.len())))
            .div_ceil(CONT_DATA_SIZE);
        let n = remaining_cont + usize::from(self.next_seq.is_none());
        (n, Some(n))
    }
}

impl ExactSizeIterator for Fragments {}

/// Writes messages to a transport one frame at a time.
#[derive(Debug, Clone)]
pub struct MessageWriter {
    pacing: Duration,
}

impl Default for MessageWriter {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_PACING)
    }
}

impl MessageWriter {
    /// Create a writer that sleeps `pacing` between frames. Zero disables it.
    pub fn new(pacing: Duration) -> Self {
        Self { pacing }
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    pub fn set_pacing(&mut self, pacing: Duration) {
        self.pacing = pacing;
    }

    /// Fragment and send a complete message.
    ///
    /// A transport failure stops the send; frames already written stay written.
    pub fn send<T: FrameTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        message: &Message,
    ) -> Result<()> {
        tracing::debug!(
            cid = format_args!("{:#010x}", message.cid),
            cmd = command_name(message.cmd),
            len = message.len(),
            "sending message"
        );

        for (index, frame) in fragment(message)?.enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                std::thread::sleep(self.pacing);
            }
            let report = frame.to_report()?;
            tracing::trace!(
                cid = format_args!("{:#010x}", frame.cid),
                init = frame.is_init(),
                data = frame.data().len(),
                "frame out"
            );
            transport.send_frame(&report)?;
        }
        Ok(())
    }

    /// Send a one-byte ERROR message on `cid`.
    pub fn send_error<T: FrameTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        cid: u32,
        code: u8,
    ) -> Result<()> {
        self.send(transport, &Message::error(cid, code))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use bytes::Bytes;
    use softu2f_transport::{Incoming, MemoryTransport};

    use super::*;
    use crate::codec::{decode_frame, FrameBody};
    use crate::command::errors::ERR_CHANNEL_BUSY;
    use crate::command::{U2FHID_ERROR, U2FHID_PING};

    fn drain(transport: &mut MemoryTransport) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Incoming::Report(raw) = transport.receive_frame().unwrap() {
            frames.push(decode_frame(&raw).unwrap());
        }
        frames
    }

    #[test]
    fn frame_counts_at_boundaries() {
        for (len, expected) in [
            (0, 1),
            (1, 1),
            (56, 1),
            (57, 1),
            (58, 2),
            (116, 2),
            (117, 3),
            (MAX_MESSAGE_SIZE, 129),
        ] {
            let msg = Message::new(1, U2FHID_PING, vec![0u8; len]);
            let frags = fragment(&msg).unwrap();
            assert_eq!(frags.len(), expected, "len {len}");
            assert_eq!(frags.count(), expected, "len {len}");
        }
    }

    #[test]
    fn sequence_numbers_increase_from_zero() {
        let msg = Message::new(1, U2FHID_PING, vec![0u8; 500]);
        let frames: Vec<Frame> = fragment(&msg).unwrap().collect();
        match &frames[0].body {
            FrameBody::Init { bcnt, data, .. } => {
                assert_eq!(*bcnt, 500);
                assert_eq!(data.len(), INIT_DATA_SIZE);
            }
            other => panic!("expected INIT, got {other:?}"),
        }
        for (i, frame) in frames[1..].iter().enumerate() {
            match &frame.body {
                FrameBody::Cont { seq, .. } => assert_eq!(usize::from(*seq), i),
                other => panic!("expected CONT, got {other:?}"),
            }
        }
    }

    #[test]
    fn oversized_message_rejected() {
        let msg = Message::new(1, U2FHID_PING, vec![0u8; MAX_MESSAGE_SIZE + 1]);
        assert!(matches!(
            fragment(&msg),
            Err(FrameError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn send_writes_every_frame() {
        let (mut device, mut host) = MemoryTransport::pair();
        let payload: Vec<u8> = (0..83u8).collect();
        let msg = Message::new(0x11, U2FHID_PING, payload.clone());

        MessageWriter::new(Duration::ZERO)
            .send(&mut device, &msg)
            .unwrap();

        let frames = drain(&mut host);
        assert_eq!(frames.len(), 2);
        let mut joined = Vec::new();
        joined.extend_from_slice(&frames[0].data()[..INIT_DATA_SIZE]);
        joined.extend_from_slice(&frames[1].data()[..83 - INIT_DATA_SIZE]);
        assert_eq!(joined, payload);
        assert!(frames[1].data()[83 - INIT_DATA_SIZE..]
            .iter()
            .all(|b| *b == 0));
    }

    #[test]
    fn pacing_delays_between_frames() {
        let (mut device, mut host) = MemoryTransport::pair();
        let msg = Message::new(1, U2FHID_PING, vec![0u8; 117]);
        let started = Instant::now();
        MessageWriter::new(Duration::from_millis(5))
            .send(&mut device, &msg)
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert_eq!(drain(&mut host).len(), 3);
    }

    #[test]
    fn send_error_is_one_byte() {
        let (mut device, mut host) = MemoryTransport::pair();
        MessageWriter::new(Duration::ZERO)
            .send_error(&mut device, 9, ERR_CHANNEL_BUSY)
            .unwrap();
        let frames = drain(&mut host);
        assert_eq!(frames.len(), 1);
        match &frames[0].body {
            FrameBody::Init { cmd, bcnt, data } => {
                assert_eq!(*cmd, U2FHID_ERROR);
                assert_eq!(*bcnt, 1);
                assert_eq!(data[0], ERR_CHANNEL_BUSY);
            }
            other => panic!("expected INIT, got {other:?}"),
        }
    }

    #[test]
    fn send_to_hung_up_peer_fails() {
        let (mut device, host) = MemoryTransport::pair();
        drop(host);
        let msg = Message::new(1, U2FHID_PING, Bytes::from_static(b"x"));
        let err = MessageWriter::new(Duration::ZERO)
            .send(&mut device, &msg)
            .unwrap_err();
        assert!(err.is_transport());
    }
}
