use serde::Serialize;
use softu2f_device::InitResponse;

use crate::cmd::{connect_client, InitArgs};
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{cid_hex, emit, hex, OutputFormat, Report};

#[derive(Serialize)]
struct InitOutput {
    cid: String,
    nonce: String,
    interface_version: u8,
    device_version: String,
    capabilities: u8,
    wink: bool,
}

impl From<&InitResponse> for InitOutput {
    fn from(resp: &InitResponse) -> Self {
        Self {
            cid: cid_hex(resp.cid),
            nonce: hex(&resp.nonce),
            interface_version: resp.interface_version,
            device_version: format!(
                "{}.{}.{}",
                resp.version_major, resp.version_minor, resp.version_build
            ),
            capabilities: resp.capabilities,
            wink: resp.supports_wink(),
        }
    }
}

impl Report for InitOutput {
    fn title(&self) -> &'static str {
        "INIT Response"
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Channel", self.cid.clone()),
            ("Nonce", self.nonce.clone()),
            ("U2FHID version", self.interface_version.to_string()),
            ("Device version", self.device_version.clone()),
            ("Capabilities", format!("{:#04x}", self.capabilities)),
            ("Wink", self.wink.to_string()),
        ]
    }
}

pub fn run(args: InitArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect_client(&args.host)?;
    let response = client
        .init()
        .map_err(|err| device_error("INIT failed", err))?;
    emit(&InitOutput::from(&response), format);
    Ok(SUCCESS)
}
