use serde::Serialize;
use softu2f_device::MAX_LOCK_SECONDS;

use crate::cmd::{open_client, LockArgs};
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{cid_hex, emit, OutputFormat, Report};

#[derive(Serialize)]
struct LockOutput {
    cid: String,
    requested_seconds: u8,
    effective_seconds: u8,
}

impl Report for LockOutput {
    fn title(&self) -> &'static str {
        "LOCK"
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let effective = if self.effective_seconds == 0 {
            "released".to_string()
        } else {
            format!("{}s", self.effective_seconds)
        };
        vec![
            ("Channel", self.cid.clone()),
            ("Requested", format!("{}s", self.requested_seconds)),
            ("Effective", effective),
        ]
    }
}

pub fn run(args: LockArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = open_client(&args.host)?;
    client
        .lock(args.seconds)
        .map_err(|err| device_error("LOCK failed", err))?;
    if args.seconds > MAX_LOCK_SECONDS {
        tracing::warn!(
            requested = args.seconds,
            max = MAX_LOCK_SECONDS,
            "device clamps lock duration"
        );
    }
    emit(
        &LockOutput {
            cid: cid_hex(client.cid()),
            requested_seconds: args.seconds,
            effective_seconds: args.seconds.min(MAX_LOCK_SECONDS),
        },
        format,
    );
    Ok(SUCCESS)
}
