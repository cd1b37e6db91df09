//! U2FHID command bytes, error codes and related constants.
//!
//! Command constants carry the INIT type bit, exactly as they appear in
//! byte 4 of an INIT frame.

/// Broadcast channel id, used only for the INIT handshake.
pub const CID_BROADCAST: u32 = 0xffff_ffff;

/// High bit of the tag byte: set for INIT frames, clear for CONT frames.
pub const TYPE_INIT: u8 = 0x80;

/// Echo the payload back.
pub const U2FHID_PING: u8 = TYPE_INIT | 0x01;
/// Encapsulated U2F APDU.
pub const U2FHID_MSG: u8 = TYPE_INIT | 0x03;
/// Place or release an exclusive channel lock.
pub const U2FHID_LOCK: u8 = TYPE_INIT | 0x04;
/// Allocate a channel id or resynchronize a channel.
pub const U2FHID_INIT: u8 = TYPE_INIT | 0x06;
/// Ask the device to identify itself visibly.
pub const U2FHID_WINK: u8 = TYPE_INIT | 0x08;
/// Cancel the in-flight message on a channel.
pub const U2FHID_SYNC: u8 = TYPE_INIT | 0x3c;
/// Error response; the payload is one error code byte.
pub const U2FHID_ERROR: u8 = TYPE_INIT | 0x3f;

/// First vendor-defined command.
pub const U2FHID_VENDOR_FIRST: u8 = TYPE_INIT | 0x40;
/// Last vendor-defined command.
pub const U2FHID_VENDOR_LAST: u8 = TYPE_INIT | 0x7f;

/// Size of the INIT request nonce.
pub const INIT_NONCE_SIZE: usize = 8;
/// Size of the INIT response payload.
pub const INIT_RESPONSE_SIZE: usize = INIT_NONCE_SIZE + 4 + 5;
/// U2FHID interface version reported in INIT responses.
pub const U2FHID_IF_VERSION: u8 = 2;
/// Capability flag: the device implements WINK.
pub const CAPFLAG_WINK: u8 = 0x01;

/// Error code payloads for [`U2FHID_ERROR`] responses.
pub mod errors {
    pub const ERR_NONE: u8 = 0x00;
    pub const ERR_INVALID_CMD: u8 = 0x01;
    pub const ERR_INVALID_PAR: u8 = 0x02;
    pub const ERR_INVALID_LEN: u8 = 0x03;
    pub const ERR_INVALID_SEQ: u8 = 0x04;
    pub const ERR_MSG_TIMEOUT: u8 = 0x05;
    pub const ERR_CHANNEL_BUSY: u8 = 0x06;
    pub const ERR_LOCK_REQUIRED: u8 = 0x0a;
    pub const ERR_SYNC_FAIL: u8 = 0x0b;
    pub const ERR_OTHER: u8 = 0x7f;
}

/// Returns a human-readable name for a command byte.
pub fn command_name(cmd: u8) -> &'static str {
    match cmd {
        U2FHID_PING => "PING",
        U2FHID_MSG => "MSG",
        U2FHID_LOCK => "LOCK",
        U2FHID_INIT => "INIT",
        U2FHID_WINK => "WINK",
        U2FHID_SYNC => "SYNC",
        U2FHID_ERROR => "ERROR",
        U2FHID_VENDOR_FIRST..=U2FHID_VENDOR_LAST => "VENDOR",
        _ => "UNKNOWN",
    }
}

/// Returns a human-readable name for an error code.
pub fn error_name(code: u8) -> &'static str {
    use errors::*;
    match code {
        ERR_NONE => "NONE",
        ERR_INVALID_CMD => "INVALID_CMD",
        ERR_INVALID_PAR => "INVALID_PAR",
        ERR_INVALID_LEN => "INVALID_LEN",
        ERR_INVALID_SEQ => "INVALID_SEQ",
        ERR_MSG_TIMEOUT => "MSG_TIMEOUT",
        ERR_CHANNEL_BUSY => "CHANNEL_BUSY",
        ERR_LOCK_REQUIRED => "LOCK_REQUIRED",
        ERR_SYNC_FAIL => "SYNC_FAIL",
        ERR_OTHER => "OTHER",
        _ => "UNKNOWN",
    }
}

/// Returns true for commands in the vendor-defined range.
pub fn is_vendor(cmd: u8) -> bool {
    (U2FHID_VENDOR_FIRST..=U2FHID_VENDOR_LAST).contains(&cmd)
}
