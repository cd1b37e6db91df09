//! Built-in command handlers.
//!
//! Each one answers on the wire through the [`DeviceContext`] and returns an
//! error only to report what went wrong to the run loop.

use softu2f_frame::command::errors::ERR_INVALID_LEN;
use softu2f_frame::{Message, CID_BROADCAST, U2FHID_INIT, U2FHID_LOCK, U2FHID_PING, U2FHID_WINK};

use crate::context::DeviceContext;
use crate::error::{DeviceError, Result};
use crate::init::{InitRequest, InitResponse};

/// Signature shared by the built-in handlers.
pub(crate) type BuiltinFn = fn(&mut DeviceContext, &Message) -> Result<()>;

/// The built-in handler for `cmd`, if there is one. MSG has none.
pub(crate) fn builtin(cmd: u8) -> Option<BuiltinFn> {
    match cmd {
        U2FHID_INIT => Some(handle_init),
        U2FHID_PING => Some(handle_ping),
        U2FHID_WINK => Some(handle_wink),
        U2FHID_LOCK => Some(handle_lock),
        _ => None,
    }
}

/// Allocate a channel (on broadcast) or resynchronize one.
pub fn handle_init(ctx: &mut DeviceContext, message: &Message) -> Result<()> {
    let request = match InitRequest::decode(&message.payload) {
        Ok(request) => request,
        Err(err) => return reject_length(ctx, message, err),
    };

    let cid = if message.cid == CID_BROADCAST {
        ctx.allocate_channel()
    } else {
        message.cid
    };
    let config = ctx.config();
    let version = (
        config.version_major,
        config.version_minor,
        config.version_build,
    );
    let response = InitResponse::new(request.nonce, cid, version);
    ctx.send_message(&Message::new(
        message.cid,
        U2FHID_INIT,
        response.encode().to_vec(),
    ))
}

/// Echo the payload.
pub fn handle_ping(ctx: &mut DeviceContext, message: &Message) -> Result<()> {
    ctx.send_message(message)
}

/// Echo the payload. There is nothing to blink, so the wink is only logged.
pub fn handle_wink(ctx: &mut DeviceContext, message: &Message) -> Result<()> {
    tracing::info!(cid = format_args!("{:#010x}", message.cid), "wink");
    ctx.send_message(message)
}

/// Apply a channel lock for the one-byte duration in seconds.
pub fn handle_lock(ctx: &mut DeviceContext, message: &Message) -> Result<()> {
    let [seconds] = message.payload[..] else {
        let err = DeviceError::InvalidLength {
            cmd: U2FHID_LOCK,
            len: message.len(),
        };
        return reject_length(ctx, message, err);
    };
    ctx.apply_lock(message.cid, seconds);
    ctx.send_message(&Message::new(message.cid, U2FHID_LOCK, Vec::new()))
}

fn reject_length(ctx: &mut DeviceContext, message: &Message, err: DeviceError) -> Result<()> {
    ctx.send_error(message.cid, ERR_INVALID_LEN)?;
    Err(err)
}
