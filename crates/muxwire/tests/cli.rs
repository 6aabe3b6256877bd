#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};

use serde_json::Value;

struct ServeGuard(Child);

impl Drop for ServeGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Start `muxwire serve` on an ephemeral port and return its address.
fn start_echo(network: &str) -> (ServeGuard, String) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_muxwire"))
        .args(["--log-level", "error", "serve", network, "127.0.0.1:0"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start");

    let stdout = child.stdout.take().expect("stdout should be piped");
    let guard = ServeGuard(child);
    let mut line = String::new();
    BufReader::new(stdout)
        .read_line(&mut line)
        .expect("serve should print its address");
    let ready: Value = serde_json::from_str(&line).expect("ready line should be JSON");
    let addr = ready["addr"].as_str().expect("addr field").to_string();
    (guard, addr)
}

fn send_json(network: &str, addr: &str, id: &str, body: &str) -> Value {
    let output = Command::new(env!("CARGO_BIN_EXE_muxwire"))
        .args([
            "--log-level",
            "error",
            "--format",
            "json",
            "send",
            network,
            addr,
            "--id",
            id,
            "--json",
            body,
            "--wait",
        ])
        .output()
        .expect("send command should run");
    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("send output should be JSON")
}

#[test]
fn send_round_trips_through_tcp_echo() {
    let (_serve, addr) = start_echo("tcp");
    let reply = send_json("tcp", &addr, "7", r#"{"greeting":"hi"}"#);
    assert_eq!(reply["message_id"], 7);
    assert_eq!(reply["body"]["greeting"], "hi");
}

#[test]
fn send_round_trips_through_udp_echo() {
    let (_serve, addr) = start_echo("udp");
    let reply = send_json("udp", &addr, "-3", "[1,2]");
    assert_eq!(reply["message_id"], -3);
    assert_eq!(reply["body"], serde_json::json!([1, 2]));
}

#[test]
fn pack_prints_hex_block() {
    let output = Command::new(env!("CARGO_BIN_EXE_muxwire"))
        .args(["--format", "pretty", "pack", "--id", "1"])
        .output()
        .expect("pack command should run");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "0000000c000000010000000000000000"
    );
}

#[test]
fn unknown_network_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_muxwire"))
        .args(["send", "http", "127.0.0.1:1", "--id", "1"])
        .output()
        .expect("send command should run");
    assert_eq!(output.status.code(), Some(64));
}
