use std::time::Duration;

use muxwire_frame::codec;
use muxwire_router::{Context, Router, RouterError};
use muxwire_server::{HeartbeatConfig, Server, DEFAULT_HEARTBEAT_MESSAGE_ID};
use serde_json::json;
use tracing::{info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{io_error, server_error, CliResult, SUCCESS};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let heartbeat = args.heartbeat.as_deref().map(parse_duration).transpose()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    runtime.block_on(serve(args, heartbeat))
}

async fn serve(args: ServeArgs, heartbeat: Option<Duration>) -> CliResult<i32> {
    let mut router = Router::new();
    let watch_heartbeats = heartbeat.is_some();
    router.on_message(move |c| echo(c, watch_heartbeats));

    let mut builder = Server::builder();
    if let Some(interval) = heartbeat {
        builder = builder.heartbeat_mode(HeartbeatConfig {
            interval,
            ..HeartbeatConfig::default()
        });
    }
    let server = builder
        .build(router)
        .map_err(|err| server_error("server setup failed", err))?;

    let addr = server
        .spawn(&args.network, &args.addr)
        .await
        .map_err(|err| server_error("listen failed", err))?;
    println!("{}", json!({ "network": args.network, "addr": addr }));
    info!(network = %args.network, %addr, "echo server ready");

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| io_error("signal handler setup failed", err))?;
    info!("interrupt received, shutting down");
    server.shutdown();
    Ok(SUCCESS)
}

/// Raw-mode handler: reply with the request's id and body bytes unchanged.
fn echo(c: &mut Context, watch_heartbeats: bool) {
    let message_id = match c.message_id() {
        Ok(id) => id,
        Err(err) => {
            warn!(error = %err, "unreadable request");
            return;
        }
    };
    if watch_heartbeats && message_id == DEFAULT_HEARTBEAT_MESSAGE_ID {
        c.recv_heartbeat();
        return;
    }

    let result = codec::body_bytes_of(c.block())
        .map_err(RouterError::from)
        .and_then(|body| c.reply_raw(message_id, body, &[]));
    if let Err(err) = result {
        warn!(conn_id = c.connection_id(), message_id, error = %err, "echo failed");
    }
}
