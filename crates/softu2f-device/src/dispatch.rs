use std::collections::HashMap;

use softu2f_frame::command::is_vendor;
use softu2f_frame::{
    command_name, Message, U2FHID_INIT, U2FHID_LOCK, U2FHID_MSG, U2FHID_PING, U2FHID_WINK,
};

use crate::context::DeviceContext;
use crate::error::{DeviceError, Result};

/// Answers one kind of complete message.
///
/// Handlers send their own responses through the context. Returning an
/// error does not send anything; the run loop logs it and moves on unless
/// the transport is gone.
pub trait Handler: Send {
    fn handle(&mut self, ctx: &mut DeviceContext, message: &Message) -> Result<()>;
}

impl<F> Handler for F
where
    F: FnMut(&mut DeviceContext, &Message) -> Result<()> + Send,
{
    fn handle(&mut self, ctx: &mut DeviceContext, message: &Message) -> Result<()> {
        self(ctx, message)
    }
}

/// Registered handlers keyed by command byte.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<u8, Box<dyn Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a handler may be registered for `cmd`.
    pub fn accepts(cmd: u8) -> bool {
        matches!(
            cmd,
            U2FHID_INIT | U2FHID_PING | U2FHID_WINK | U2FHID_LOCK | U2FHID_MSG
        ) || is_vendor(cmd)
    }

    /// Register `handler` for `cmd`, replacing any earlier registration.
    pub fn register(&mut self, cmd: u8, handler: impl Handler + 'static) -> Result<()> {
        if !Self::accepts(cmd) {
            return Err(DeviceError::InvalidRegistration(cmd));
        }
        if self.handlers.insert(cmd, Box::new(handler)).is_some() {
            tracing::debug!(cmd = command_name(cmd), "replaced registered handler");
        }
        Ok(())
    }

    pub fn get_mut(&mut self, cmd: u8) -> Option<&mut (dyn Handler + 'static)> {
        self.handlers.get_mut(&cmd).map(|handler| handler.as_mut())
    }

    pub fn contains(&self, cmd: u8) -> bool {
        self.handlers.contains_key(&cmd)
    }

    /// Registered command bytes in ascending order.
    pub fn commands(&self) -> Vec<u8> {
        let mut commands: Vec<u8> = self.handlers.keys().copied().collect();
        commands.sort_unstable();
        commands
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("commands", &self.commands())
            .finish()
    }
}
