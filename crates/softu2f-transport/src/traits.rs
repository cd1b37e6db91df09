use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// Size of one HID report exchanged with the host.
pub const REPORT_SIZE: usize = 64;

/// One outbound HID report.
pub type Report = [u8; REPORT_SIZE];

/// Result of polling a transport for inbound data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// One raw report as delivered by the link.
    ///
    /// The length is whatever the link produced; callers validate it.
    Report(Bytes),
    /// Nothing is queued right now. Not an error.
    NoDataYet,
}

/// A duplex link carrying fixed-size HID reports.
///
/// This is the boundary to whatever actually moves reports between the host
/// and the emulated device: a kernel driver shim, a virtual HID node, a
/// socket, or an in-process queue.
///
/// `receive_frame` never blocks. Callers that find nothing queued block in
/// `wait_for_input`, which returns when input may be available or when the
/// timeout elapses, whichever comes first.
pub trait FrameTransport {
    /// Acquire the underlying connection. Idempotent.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the underlying connection. Idempotent.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Write one report.
    fn send_frame(&mut self, report: &Report) -> Result<()>;

    /// Poll for one inbound report without blocking.
    fn receive_frame(&mut self) -> Result<Incoming>;

    /// Block until input is plausible or `timeout` elapses.
    ///
    /// Spurious wakeups are allowed; callers always re-poll.
    fn wait_for_input(&mut self, timeout: Duration) -> Result<()>;
}

impl<T: FrameTransport + ?Sized> FrameTransport for &mut T {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn send_frame(&mut self, report: &Report) -> Result<()> {
        (**self).send_frame(report)
    }

    fn receive_frame(&mut self) -> Result<Incoming> {
        (**self).receive_frame()
    }

    fn wait_for_input(&mut self, timeout: Duration) -> Result<()> {
        (**self).wait_for_input(timeout)
    }
}

impl<T: FrameTransport + ?Sized> FrameTransport for Box<T> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn send_frame(&mut self, report: &Report) -> Result<()> {
        (**self).send_frame(report)
    }

    fn receive_frame(&mut self) -> Result<Incoming> {
        (**self).receive_frame()
    }

    fn wait_for_input(&mut self, timeout: Duration) -> Result<()> {
        (**self).wait_for_input(timeout)
    }
}
