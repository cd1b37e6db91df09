use std::time::Duration;

use serde::Serialize;
use softu2f_device::{Device, DeviceConfig, DeviceError, ShutdownHandle};
use softu2f_frame::FrameError;
use softu2f_transport::{TransportError, UnixDomainSocket};

use crate::cmd::ServeArgs;
use crate::exit::{device_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{emit, OutputFormat, Report};

const ACCEPT_POLL: Duration = Duration::from_millis(200);

#[derive(Serialize)]
struct ServeSummary {
    path: String,
    connections: u64,
    stopped_by: &'static str,
}

impl Report for ServeSummary {
    fn title(&self) -> &'static str {
        "Serve Summary"
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Socket", self.path.clone()),
            ("Connections", self.connections.to_string()),
            ("Stopped by", self.stopped_by.to_string()),
        ]
    }
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args)?;
    let socket =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;

    let shutdown = ShutdownHandle::new();
    install_ctrlc_handler(shutdown.clone())?;

    tracing::info!(path = %args.path.display(), "waiting for host");

    let mut connections = 0u64;
    while !shutdown.is_requested() {
        let transport = match socket.accept_timeout(ACCEPT_POLL) {
            Ok(Some(transport)) => transport,
            Ok(None) => continue,
            Err(err) => return Err(transport_error("accept failed", err)),
        };
        connections += 1;

        let mut device = Device::open(transport, config.clone())
            .map_err(|err| device_error("device open failed", err))?
            .with_shutdown_handle(shutdown.clone());

        match device.run() {
            Ok(()) => {}
            Err(err) if is_disconnect(&err) => tracing::info!("host detached"),
            Err(err) => tracing::warn!(%err, "device stopped"),
        }
        drop(device);

        if args.once {
            break;
        }
    }

    let summary = ServeSummary {
        path: args.path.display().to_string(),
        connections,
        stopped_by: if shutdown.is_requested() {
            "signal"
        } else {
            "host"
        },
    };
    emit(&summary, format);
    Ok(SUCCESS)
}

fn load_config(args: &ServeArgs) -> CliResult<DeviceConfig> {
    let mut config = match &args.config {
        Some(path) => DeviceConfig::from_json_file(path)
            .map_err(|err| device_error("config load failed", err))?,
        None => DeviceConfig::default(),
    };
    if let Some(pacing) = args.pacing_ms {
        config.frame_pacing_ms = pacing;
    }
    Ok(config)
}

fn is_disconnect(err: &DeviceError) -> bool {
    matches!(
        err,
        DeviceError::Transport(TransportError::Closed)
            | DeviceError::Frame(FrameError::Transport(TransportError::Closed))
    )
}

fn install_ctrlc_handler(shutdown: ShutdownHandle) -> CliResult<()> {
    ctrlc::set_handler(move || shutdown.request()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
