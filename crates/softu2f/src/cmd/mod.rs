use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use softu2f_device::{DeviceError, HostClient};
use softu2f_transport::{SocketTransport, TransportError};

use crate::exit::{device_error, CliError, CliResult, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod init;
pub mod lock;
pub mod ping;
pub mod serve;
pub mod version;
pub mod wink;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve an emulated U2F device on a Unix socket.
    Serve(ServeArgs),
    /// Allocate a channel and print the device's INIT response.
    Init(InitArgs),
    /// Allocate a channel and check that PING echoes.
    Ping(PingArgs),
    /// Ask the device to identify itself.
    Wink(WinkArgs),
    /// Lock the device to a fresh channel for a few seconds.
    Lock(LockArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Init(args) => init::run(args, format),
        Command::Ping(args) => ping::run(args, format),
        Command::Wink(args) => wink::run(args, format),
        Command::Lock(args) => lock::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Device configuration file (JSON).
    #[arg(long, value_name = "FILE", env = "SOFTU2F_CONFIG")]
    pub config: Option<PathBuf>,
    /// Delay between outbound frames in milliseconds. Overrides the config file.
    #[arg(long, value_name = "MS")]
    pub pacing_ms: Option<u64>,
    /// Exit after the first host disconnects.
    #[arg(long)]
    pub once: bool,
}

/// Socket and timeout shared by the host-side commands.
#[derive(Args, Debug)]
pub struct HostArgs {
    /// Socket path of a running `softu2f serve`.
    pub path: PathBuf,
    /// How long to wait for the socket and for each response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub host: HostArgs,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    #[command(flatten)]
    pub host: HostArgs,
    /// Payload to echo.
    #[arg(long, conflicts_with = "size")]
    pub data: Option<String>,
    /// Echo this many generated bytes instead.
    #[arg(long, conflicts_with = "data")]
    pub size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct WinkArgs {
    #[command(flatten)]
    pub host: HostArgs,
}

#[derive(Args, Debug)]
pub struct LockArgs {
    #[command(flatten)]
    pub host: HostArgs,
    /// Lock duration in seconds; the device caps it at 10, 0 releases.
    #[arg(long, default_value_t = 3)]
    pub seconds: u8,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Connect to a served device, retrying while the socket is not up yet.
///
/// The client is still on the broadcast channel.
pub(crate) fn connect_client(host: &HostArgs) -> CliResult<HostClient<SocketTransport>> {
    let timeout = parse_timeout(&host.timeout)?;
    Ok(connect_with_timeout(&host.path, timeout)?.with_timeout(timeout))
}

/// Connect and allocate a channel.
pub(crate) fn open_client(host: &HostArgs) -> CliResult<HostClient<SocketTransport>> {
    let mut client = connect_client(host)?;
    client
        .init()
        .map_err(|err| device_error("INIT failed", err))?;
    Ok(client)
}

fn connect_with_timeout(path: &Path, timeout: Duration) -> CliResult<HostClient<SocketTransport>> {
    let start = Instant::now();
    loop {
        match HostClient::connect(path) {
            Ok(client) => return Ok(client),
            Err(err) => {
                if !is_retryable_connect_error(&err) {
                    return Err(device_error("connect failed", err));
                }
                if start.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("connect timed out after {timeout:?}"),
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn is_retryable_connect_error(err: &DeviceError) -> bool {
    match err {
        DeviceError::Transport(TransportError::Connect { source, .. }) => matches!(
            source.kind(),
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
        ),
        _ => false,
    }
}
