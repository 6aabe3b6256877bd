mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "muxwire", version, about = "muxwire framing and server CLI")]
struct Cli {
    /// Output format. Default: table on a terminal, json otherwise.
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
    match cmd::run(cli.command, format) {
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
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "muxwire",
            "send",
            "tcp",
            "127.0.0.1:8111",
            "--id",
            "5",
            "--data",
            "hello",
            "--header",
            "trace=abc",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.body.id, 5);
        assert_eq!(args.body.headers, ["trace=abc"]);
    }

    #[test]
    fn rejects_conflicting_body_args() {
        let err = Cli::try_parse_from([
            "muxwire",
            "send",
            "tcp",
            "127.0.0.1:8111",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_serve_with_heartbeat() {
        let cli = Cli::try_parse_from(["muxwire", "serve", "udp", ":0", "--heartbeat", "3s"])
            .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(_)));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["muxwire", "pack", "--id", "1", "--format", "raw"])
            .expect("pack args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Raw)));
    }
}
