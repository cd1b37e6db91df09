use std::time::Instant;

use serde::Serialize;
use softu2f_frame::MAX_MESSAGE_SIZE;

use crate::cmd::{open_client, PingArgs};
use crate::exit::{device_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{cid_hex, emit, OutputFormat, Report};

#[derive(Serialize)]
struct PingOutput {
    cid: String,
    size: usize,
    frames: usize,
    latency_ms: f64,
    echoed: bool,
}

impl Report for PingOutput {
    fn title(&self) -> &'static str {
        "PING"
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Channel", self.cid.clone()),
            ("Size", format!("{} bytes", self.size)),
            ("Frames", self.frames.to_string()),
            ("Round trip", format!("{:.2}ms", self.latency_ms)),
            ("Echoed", self.echoed.to_string()),
        ]
    }
}

pub fn run(args: PingArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = build_payload(&args)?;
    let size = payload.len();
    let mut client = open_client(&args.host)?;

    let started = Instant::now();
    client
        .ping(payload)
        .map_err(|err| device_error("PING failed", err))?;
    let elapsed = started.elapsed();

    let out = PingOutput {
        cid: cid_hex(client.cid()),
        size,
        frames: frame_count(size),
        latency_ms: (elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0,
        echoed: true,
    };
    emit(&out, format);
    Ok(SUCCESS)
}

fn build_payload(args: &PingArgs) -> CliResult<Vec<u8>> {
    let payload = match (&args.data, args.size) {
        (Some(data), _) => data.as_bytes().to_vec(),
        (None, Some(size)) => (0..size).map(|i| (i % 251) as u8).collect(),
        (None, None) => return Err(CliError::new(USAGE, "one of --data or --size is required")),
    };
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "payload is {} bytes, a U2FHID message holds at most {MAX_MESSAGE_SIZE}",
                payload.len()
            ),
        ));
    }
    Ok(payload)
}

fn frame_count(size: usize) -> usize {
    use softu2f_frame::{CONT_DATA_SIZE, INIT_DATA_SIZE};
    1 + size.saturating_sub(INIT_DATA_SIZE).div_ceil(CONT_DATA_SIZE)
}
