use muxwire_frame::Marshaller;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("muxwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: muxwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    let marshallers: Vec<String> = [Marshaller::Json, Marshaller::Toml, Marshaller::Xml, Marshaller::Yaml]
        .into_iter()
        .map(|m| format!("{m}={}", m.is_enabled()))
        .collect();
    println!("marshallers: {}", marshallers.join(", "));
    println!("networks: tcp, tcp4, tcp6, unix, udp, udp4, udp6");

    Ok(SUCCESS)
}
