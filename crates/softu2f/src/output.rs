use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A command result that can be printed in every output format.
pub trait Report: Serialize {
    /// Heading for the table and pretty formats.
    fn title(&self) -> &'static str;

    /// Field/value pairs for the table and pretty formats.
    fn rows(&self) -> Vec<(&'static str, String)>;
}

pub fn emit<R: Report>(report: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![report.title(), ""]);
            for (field, value) in report.rows() {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{}:", report.title());
            let rows = report.rows();
            let width = rows.iter().map(|(field, _)| field.len()).max().unwrap_or(0);
            for (field, value) in rows {
                println!("  {field:<width$}  {value}");
            }
        }
    }
}

/// Lowercase hex without separators.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Channel ids are conventionally shown as eight hex digits.
pub fn cid_hex(cid: u32) -> String {
    format!("{cid:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_formatting() {
        assert_eq!(hex(&[0x00, 0xab, 0x10]), "00ab10");
        assert_eq!(cid_hex(1), "00000001");
        assert_eq!(cid_hex(u32::MAX), "ffffffff");
    }
}
