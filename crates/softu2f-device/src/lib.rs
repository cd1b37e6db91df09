//! The softu2f device engine.
//!
//! Sits on top of a [`softu2f_transport::FrameTransport`] and turns raw
//! 64-byte reports into answered U2FHID commands:
//! - reassembles messages, one in flight at a time
//! - enforces the optional exclusive channel lock
//! - dispatches INIT, PING, WINK and LOCK to built-in handlers and MSG or
//!   vendor commands to registered ones
//!
//! [`HostClient`] is the other end of the wire, for tests and tooling.

pub mod client;
pub mod clock;
pub mod config;
pub mod context;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod init;
pub mod lock;
pub mod shutdown;

pub use client::{HostClient, DEFAULT_RESPONSE_TIMEOUT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DeviceConfig;
pub use context::DeviceContext;
pub use device::{Device, RunState};
pub use dispatch::{Handler, HandlerTable};
pub use error::{DeviceError, Result};
pub use init::{InitRequest, InitResponse};
pub use lock::{ChannelLock, LockManager, MAX_LOCK_SECONDS};
pub use shutdown::ShutdownHandle;
