use softu2f_frame::command::errors::ERR_OTHER;
use softu2f_frame::{command_name, Message};
use softu2f_transport::FrameTransport;

use crate::clock::{Clock, SystemClock};
use crate::config::DeviceConfig;
use crate::context::DeviceContext;
use crate::dispatch::{Handler, HandlerTable};
use crate::error::{DeviceError, Result};
use crate::handlers::builtin;
use crate::shutdown::ShutdownHandle;

/// Lifecycle of the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Opened, not running.
    Idle,
    Running,
    Stopped,
}

/// One emulated U2F device bound to a transport.
pub struct Device {
    ctx: DeviceContext,
    handlers: HandlerTable,
    state: RunState,
    closed: bool,
}

impl Device {
    /// Open a device on `transport` using the system clock.
    pub fn open<T>(transport: T, config: DeviceConfig) -> Result<Self>
    where
        T: FrameTransport + Send + 'static,
    {
        Self::open_with_clock(transport, config, SystemClock)
    }

    /// Open a device with an explicit clock.
    pub fn open_with_clock<T, C>(transport: T, config: DeviceConfig, clock: C) -> Result<Self>
    where
        T: FrameTransport + Send + 'static,
        C: Clock + 'static,
    {
        config.validate()?;
        let mut ctx = DeviceContext::new(Box::new(transport), config, Box::new(clock));
        ctx.open_transport()?;
        tracing::info!(
            first_channel_id = ctx.config().first_channel_id,
            pacing_ms = ctx.config().frame_pacing_ms,
            "device opened"
        );
        Ok(Self {
            ctx,
            handlers: HandlerTable::new(),
            state: RunState::Idle,
            closed: false,
        })
    }

    /// Register a handler for a built-in or vendor command.
    ///
    /// Registered handlers take precedence over built-ins. MSG has no
    /// built-in, so a device without a MSG handler answers it with
    /// `ERR_OTHER`.
    pub fn register_handler(&mut self, cmd: u8, handler: impl Handler + 'static) -> Result<()> {
        self.handlers.register(cmd, handler)
    }

    /// Share an existing shutdown handle, so one signal can stop several
    /// devices.
    pub fn with_shutdown_handle(mut self, handle: ShutdownHandle) -> Self {
        self.ctx.set_shutdown_handle(handle);
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.ctx.shutdown_handle()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut DeviceContext {
        &mut self.ctx
    }

    /// Read the next complete message. See [`DeviceContext::read_message`].
    pub fn read_message(&mut self) -> Result<Option<Message>> {
        self.ctx.read_message()
    }

    /// Route a complete message: registered handler, then built-in, then
    /// `ERR_OTHER`.
    pub fn dispatch(&mut self, message: &Message) -> Result<()> {
        if let Some(handler) = self.handlers.get_mut(message.cmd) {
            tracing::debug!(cmd = message.command_name(), "dispatching to registered handler");
            return handler.handle(&mut self.ctx, message);
        }
        if let Some(handler) = builtin(message.cmd) {
            tracing::debug!(cmd = message.command_name(), "dispatching to built-in handler");
            return handler(&mut self.ctx, message);
        }

        tracing::debug!(cmd = command_name(message.cmd), "no handler");
        self.ctx.send_error(message.cid, ERR_OTHER)?;
        Err(DeviceError::UnsupportedCommand(message.cmd))
    }

    /// Read and dispatch messages until shutdown or transport failure.
    ///
    /// Per-message errors are logged and skipped.
    pub fn run(&mut self) -> Result<()> {
        self.state = RunState::Running;
        tracing::info!("device run loop started");

        let result = loop {
            if self.ctx.shutdown_requested() {
                break Ok(());
            }

            let message = match self.ctx.read_message() {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(err) if err.is_fatal() => break Err(err),
                Err(err) => {
                    tracing::warn!(%err, "message dropped");
                    continue;
                }
            };

            if let Err(err) = self.dispatch(&message) {
                if err.is_fatal() {
                    break Err(err);
                }
                tracing::warn!(
                    cid = format_args!("{:#010x}", message.cid),
                    cmd = message.command_name(),
                    %err,
                    "command failed"
                );
            }
        };

        self.state = RunState::Stopped;
        match &result {
            Ok(()) => tracing::info!("device run loop stopped"),
            Err(err) => tracing::warn!(%err, "device run loop stopped on transport failure"),
        }
        result
    }

    /// Release the transport. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.state = RunState::Stopped;
        self.ctx.close_transport()?;
        tracing::info!("device closed");
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::debug!(%err, "error closing device on drop");
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("state", &self.state)
            .field("handlers", &self.handlers)
            .field("ctx", &self.ctx)
            .finish()
    }
}
