//! A software FIDO U2F authenticator.
//!
//! softu2f emulates the U2FHID transport of a hardware security key: hosts
//! exchange 64-byte HID reports with it, and it answers INIT, PING, WINK,
//! LOCK and SYNC itself while handing MSG (U2F APDUs) to a registered
//! handler.
//!
//! # Crate Structure
//!
//! - [`transport`]: the report transport interface, an in-process pair and a
//!   Unix-socket virtual HID link
//! - [`frame`]: U2FHID frame codec, message reassembly and fragmentation
//! - [`device`]: channel locks, command dispatch, the device run loop and a
//!   host-side client (behind the `device` feature)

/// Re-export transport types.
pub mod transport {
    pub use softu2f_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use softu2f_frame::*;
}

/// Re-export device types (requires `device` feature).
#[cfg(feature = "device")]
pub mod device {
    pub use softu2f_device::*;
}
