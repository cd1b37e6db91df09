use serde::Serialize;

use crate::cmd::{open_client, WinkArgs};
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{cid_hex, emit, OutputFormat, Report};

#[derive(Serialize)]
struct WinkOutput {
    cid: String,
    winked: bool,
}

impl Report for WinkOutput {
    fn title(&self) -> &'static str {
        "WINK"
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Channel", self.cid.clone()),
            ("Winked", self.winked.to_string()),
        ]
    }
}

pub fn run(args: WinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = open_client(&args.host)?;
    client
        .wink()
        .map_err(|err| device_error("WINK failed", err))?;
    emit(
        &WinkOutput {
            cid: cid_hex(client.cid()),
            winked: true,
        },
        format,
    );
    Ok(SUCCESS)
}
