use std::time::Duration;

use clap::{Args, Subcommand};
use muxwire_frame::Header;
use serde_json::Value;

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod pack;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an echo server that replies with each request's id and body.
    Serve(ServeArgs),
    /// Send one message and optionally wait for the reply.
    Send(SendArgs),
    /// Print a packed block as hex.
    Pack(PackArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Pack(args) => pack::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Network: tcp, tcp4, tcp6, unix, udp, udp4, udp6.
    pub network: String,
    /// Address to bind (host:port, :port, or a socket path for unix).
    pub addr: String,
    /// Close stream connections that send no heartbeat for three intervals (e.g. 10s, 500ms).
    #[arg(long)]
    pub heartbeat: Option<String>,
}

/// Message content shared by `send` and `pack`.
#[derive(Args, Debug)]
pub struct BodyArgs {
    /// Message id.
    #[arg(long, allow_negative_numbers = true)]
    pub id: i32,
    /// JSON body.
    #[arg(long, conflicts_with = "data")]
    pub json: Option<String>,
    /// Raw string body, sent verbatim.
    #[arg(long, conflicts_with = "json")]
    pub data: Option<String>,
    /// Header entry as key=value; repeatable. JSON values are kept typed.
    #[arg(long = "header", value_name = "KEY=VALUE")]
    pub headers: Vec<String>,
    /// Route by URL pattern instead of message id.
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Network: tcp, tcp4, tcp6, unix, udp, udp4, udp6.
    pub network: String,
    /// Server address.
    pub addr: String,
    #[command(flatten)]
    pub body: BodyArgs,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct PackArgs {
    #[command(flatten)]
    pub body: BodyArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `--header key=value` entries. Values that parse as JSON keep their
/// type; anything else is a string.
pub fn parse_headers(entries: &[String]) -> CliResult<Header> {
    let mut header = Header::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| CliError::usage(format!("header must be key=value: {entry}")))?;
        if key.is_empty() {
            return Err(CliError::usage(format!("header key must not be empty: {entry}")));
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        header.insert(key.to_string(), value);
    }
    Ok(header)
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
