//! HID report transports for the softu2f device.
//!
//! The protocol engine never touches a real HID endpoint. It talks to a
//! [`FrameTransport`], which moves fixed 64-byte reports in both directions
//! and can block until new input is plausible:
//! - [`MemoryTransport`]: two connected in-process ends (tests, embedding)
//! - [`UnixDomainSocket`] / [`SocketTransport`]: a virtual HID link over a
//!   Unix stream socket (Linux/macOS)
//!
//! This is the lowest layer of softu2f. Everything else builds on top of it.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
mod poll;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use traits::{FrameTransport, Incoming, Report, REPORT_SIZE};

#[cfg(unix)]
pub use uds::{SocketTransport, UnixDomainSocket};
