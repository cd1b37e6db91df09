use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{FrameTransport, Incoming, Report};

#[derive(Default)]
struct QueueState {
    reports: VecDeque<Bytes>,
    closed: bool,
}

/// One direction of an in-process link.
#[derive(Default)]
struct Queue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl Queue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hang_up(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}

/// One end of an in-process report link.
///
/// Created in connected pairs with [`MemoryTransport::pair`]. Reports sent on
/// one end are received, in order, on the other. Dropping or closing an end
/// hangs up the link: the other end still drains what was already queued,
/// then sees [`TransportError::Closed`].
pub struct MemoryTransport {
    inbound: Arc<Queue>,
    outbound: Arc<Queue>,
    closed: bool,
}

impl MemoryTransport {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Queue::default());
        let b_to_a = Arc::new(Queue::default());
        let a = Self {
            inbound: Arc::clone(&b_to_a),
            outbound: Arc::clone(&a_to_b),
            closed: false,
        };
        let b = Self {
            inbound: a_to_b,
            outbound: b_to_a,
            closed: false,
        };
        (a, b)
    }

    /// Queue raw bytes for the other end without any size check.
    ///
    /// Real links can hand over short or oversized reports; this lets tests
    /// and simulations reproduce that.
    pub fn send_raw(&mut self, data: impl Into<Bytes>) -> Result<()> {
        self.push(data.into())
    }

    /// Number of reports queued for this end.
    pub fn pending(&self) -> usize {
        self.inbound.lock().reports.len()
    }

    fn push(&mut self, report: Bytes) -> Result<()> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        let mut state = self.outbound.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.reports.push_back(report);
        drop(state);
        self.outbound.ready.notify_all();
        Ok(())
    }

    fn hang_up(&self) {
        self.outbound.hang_up();
        self.inbound.hang_up();
    }
}

impl FrameTransport for MemoryTransport {
    fn close(&mut self) -> Result<()> {
        if !self.closed {
            debug!("closing in-process transport");
            self.closed = true;
            self.hang_up();
        }
        Ok(())
    }

    fn send_frame(&mut self, report: &Report) -> Result<()> {
        self.push(Bytes::copy_from_slice(report))
    }

    fn receive_frame(&mut self) -> Result<Incoming> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        let mut state = self.inbound.lock();
        match state.reports.pop_front() {
            Some(report) => Ok(Incoming::Report(report)),
            None if state.closed => Err(TransportError::Closed),
            None => Ok(Incoming::NoDataYet),
        }
    }

    fn wait_for_input(&mut self, timeout: Duration) -> Result<()> {
        let state = self.inbound.lock();
        if !state.reports.is_empty() || state.closed {
            return Ok(());
        }
        let _state = self
            .inbound
            .ready
            .wait_timeout(state, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.hang_up();
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("pending", &self.pending())
            .field("closed", &self.closed)
            .finish()
    }
}
