use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{emit, OutputFormat, Report};

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    profile: &'static str,
    u2fhid_interface: u8,
    features: Vec<&'static str>,
}

impl Report for VersionOutput {
    fn title(&self) -> &'static str {
        "Version"
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.to_string()),
            ("Version", self.version.to_string()),
            ("Target", self.target.to_string()),
            ("Profile", self.profile.to_string()),
            ("U2FHID interface", self.u2fhid_interface.to_string()),
            ("Features", self.features.join(", ")),
        ]
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("softu2f {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let mut features = vec!["cli"];
    if cfg!(feature = "device") {
        features.push("device");
    }
    if cfg!(feature = "async") {
        features.push("async");
    }

    let out = VersionOutput {
        name: "softu2f",
        version: env!("CARGO_PKG_VERSION"),
        target: option_env!("SOFTU2F_BUILD_TARGET").unwrap_or("unknown"),
        profile: option_env!("SOFTU2F_BUILD_PROFILE").unwrap_or("unknown"),
        u2fhid_interface: softu2f_frame::U2FHID_IF_VERSION,
        features,
    };
    emit(&out, format);
    Ok(SUCCESS)
}
