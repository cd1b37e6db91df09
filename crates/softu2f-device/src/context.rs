use std::time::Duration;

use softu2f_frame::command::errors::ERR_CHANNEL_BUSY;
use softu2f_frame::{
    command_name, decode_frame, Assembly, Frame, FrameBody, Message, MessageWriter, Reassembler,
    CID_BROADCAST, U2FHID_SYNC,
};
use softu2f_transport::{FrameTransport, Incoming};

use crate::clock::Clock;
use crate::config::DeviceConfig;
use crate::error::Result;
use crate::lock::{ChannelLock, LockManager};
use crate::shutdown::ShutdownHandle;

/// Everything a command handler may touch while answering a message.
///
/// Owns the transport, the in-flight reassembly slot, the channel lock and
/// the channel id counter.
pub struct DeviceContext {
    transport: Box<dyn FrameTransport + Send>,
    next_cid: u32,
    locks: LockManager,
    shutdown: ShutdownHandle,
    reassembler: Reassembler,
    writer: MessageWriter,
    clock: Box<dyn Clock>,
    config: DeviceConfig,
}

impl DeviceContext {
    pub(crate) fn new(
        transport: Box<dyn FrameTransport + Send>,
        config: DeviceConfig,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            next_cid: config.first_channel_id,
            locks: LockManager::new(),
            shutdown: ShutdownHandle::new(),
            reassembler: Reassembler::new(),
            writer: MessageWriter::new(config.frame_pacing()),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub(crate) fn set_shutdown_handle(&mut self, handle: ShutdownHandle) {
        self.shutdown = handle;
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.is_requested()
    }

    /// Send a complete message, fragmenting and pacing as configured.
    pub fn send_message(&mut self, message: &Message) -> Result<()> {
        self.writer.send(&mut *self.transport, message)?;
        Ok(())
    }

    /// Send a one-byte ERROR message on `cid`.
    pub fn send_error(&mut self, cid: u32, code: u8) -> Result<()> {
        self.writer.send_error(&mut *self.transport, cid, code)?;
        Ok(())
    }

    /// Install, replace or release the channel lock. Returns the clamped
    /// duration.
    pub fn apply_lock(&mut self, cid: u32, seconds: u8) -> Duration {
        let now = self.clock.now();
        self.locks.apply(cid, seconds, now)
    }

    /// True when frames on `cid` may be processed right now.
    pub fn is_permitted(&mut self, cid: u32) -> bool {
        let now = self.clock.now();
        self.locks.is_permitted(cid, now)
    }

    pub fn lock_holder(&self) -> Option<ChannelLock> {
        self.locks.holder()
    }

    /// Channel of the message being reassembled, if any.
    pub fn in_flight(&self) -> Option<u32> {
        self.reassembler.in_flight()
    }

    /// Hand out the next channel id.
    ///
    /// Never returns 0 or the broadcast id, wrapping back to 1.
    pub fn allocate_channel(&mut self) -> u32 {
        let cid = self.next_cid;
        let mut next = cid.wrapping_add(1);
        if next == CID_BROADCAST || next == 0 {
            next = 1;
        }
        self.next_cid = next;
        tracing::info!(cid = format_args!("{cid:#010x}"), "channel allocated");
        cid
    }

    pub(crate) fn close_transport(&mut self) -> Result<()> {
        self.reassembler.reset();
        self.transport.close()?;
        Ok(())
    }

    pub(crate) fn open_transport(&mut self) -> Result<()> {
        self.transport.open()?;
        Ok(())
    }

    /// Read frames until a complete message is available.
    ///
    /// Returns `Ok(None)` when shutdown was requested, when a SYNC cancelled
    /// the in-flight message, or when a sequence error aborted it. Protocol
    /// violations are answered on the wire before returning or continuing.
    pub fn read_message(&mut self) -> Result<Option<Message>> {
        loop {
            if self.shutdown.is_requested() {
                return Ok(None);
            }

            let raw = match self.transport.receive_frame()? {
                Incoming::Report(raw) => raw,
                Incoming::NoDataYet => {
                    self.transport.wait_for_input(self.config.input_wait())?;
                    continue;
                }
            };

            let frame = match decode_frame(&raw) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(%err, "discarding malformed report");
                    continue;
                }
            };
            trace_frame(&frame);

            if !self.reassembler.cancels(&frame) && !self.is_permitted(frame.cid) {
                tracing::warn!(
                    cid = format_args!("{:#010x}", frame.cid),
                    "channel is locked out, rejecting frame"
                );
                self.send_error(frame.cid, ERR_CHANNEL_BUSY)?;
                continue;
            }

            match self.reassembler.accept(frame)? {
                Assembly::Incomplete => {}
                Assembly::Complete(message) => return Ok(Some(message)),
                Assembly::Cancelled { cid, nonce } => {
                    tracing::info!(
                        cid = format_args!("{cid:#010x}"),
                        "SYNC cancelled in-flight message"
                    );
                    self.send_message(&Message::new(cid, U2FHID_SYNC, vec![nonce]))?;
                    return Ok(None);
                }
                Assembly::Rejected(rejection) => {
                    tracing::warn!(%rejection, "rejecting frame");
                    if let Some(code) = rejection.error_code() {
                        self.send_error(rejection.cid(), code)?;
                    }
                    if rejection.aborts() {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

fn trace_frame(frame: &Frame) {
    match &frame.body {
        FrameBody::Init { cmd, bcnt, .. } => tracing::trace!(
            cid = format_args!("{:#010x}", frame.cid),
            cmd = command_name(*cmd),
            bcnt,
            "INIT frame in"
        ),
        FrameBody::Cont { seq, .. } => tracing::trace!(
            cid = format_args!("{:#010x}", frame.cid),
            seq,
            "CONT frame in"
        ),
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("next_cid", &self.next_cid)
            .field("locks", &self.locks)
            .field("in_flight", &self.reassembler.in_flight())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use softu2f_transport::MemoryTransport;

    use super::*;
    use crate::clock::ManualClock;

    fn context(first: u32) -> (DeviceContext, MemoryTransport) {
        let (device, host) = MemoryTransport::pair();
        let config = DeviceConfig {
            first_channel_id: first,
            frame_pacing_ms: 0,
            input_wait_ms: 10,
            ..DeviceConfig::default()
        };
        let ctx = DeviceContext::new(Box::new(device), config, Box::new(ManualClock::new()));
        (ctx, host)
    }

    #[test]
    fn channel_ids_are_sequential() {
        let (mut ctx, _host) = context(1);
        assert_eq!(ctx.allocate_channel(), 1);
        assert_eq!(ctx.allocate_channel(), 2);
        assert_eq!(ctx.allocate_channel(), 3);
    }

    #[test]
    fn channel_ids_skip_reserved_values_on_wrap() {
        let (mut ctx, _host) = context(0xffff_fffe);
        assert_eq!(ctx.allocate_channel(), 0xffff_fffe);
        assert_eq!(ctx.allocate_channel(), 1);
    }

    #[test]
    fn shutdown_stops_reading() {
        let (mut ctx, _host) = context(1);
        ctx.shutdown_handle().request();
        assert!(ctx.read_message().unwrap().is_none());
    }

    #[test]
    fn hung_up_host_is_fatal() {
        let (mut ctx, host) = context(1);
        drop(host);
        let err = ctx.read_message().unwrap_err();
        assert!(err.is_fatal());
    }
}
