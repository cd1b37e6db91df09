mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "softu2f", version, about = "Software U2F authenticator over U2FHID")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "softu2f",
            "serve",
            "/tmp/u2f.sock",
            "--pacing-ms",
            "0",
            "--once",
        ])
        .expect("serve args should parse");

        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.pacing_ms, Some(0));
                assert!(args.once);
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_ping_payloads() {
        let err = Cli::try_parse_from([
            "softu2f",
            "ping",
            "/tmp/u2f.sock",
            "--data",
            "hello",
            "--size",
            "100",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn lock_defaults_and_override() {
        let cli = Cli::try_parse_from(["softu2f", "lock", "/tmp/u2f.sock"]).unwrap();
        assert!(matches!(cli.command, Command::Lock(ref args) if args.seconds == 3));

        let cli =
            Cli::try_parse_from(["softu2f", "lock", "/tmp/u2f.sock", "--seconds", "12"]).unwrap();
        assert!(matches!(cli.command, Command::Lock(ref args) if args.seconds == 12));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "softu2f",
            "init",
            "/tmp/u2f.sock",
            "--timeout",
            "3s",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("init args should parse");
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Command::Init(args) => assert_eq!(args.host.timeout, "3s"),
            other => panic!("expected init, got {other:?}"),
        }
    }
}
