//! Server lifecycle for muxwire.
//!
//! A [`Server`] owns a frozen [`Router`](muxwire_router::Router) and any
//! number of listeners. Stream connections get a reader loop, a writer task
//! and optional heartbeat/auth watchdogs; datagram sockets dispatch each
//! datagram as its own request. Handlers run on the blocking pool, so a
//! slow handler never stalls a read loop.
//!
//! ```no_run
//! use muxwire_router::Router;
//! use muxwire_server::Server;
//!
//! # async fn run() -> muxwire_server::Result<()> {
//! let mut router = Router::new();
//! router.add_handler(1, |c| {
//!     let _ = c.reply_json(1, &"pong", &[]);
//! })?;
//! let server = Server::builder().build(router)?;
//! server.listen_and_serve("tcp", "127.0.0.1:8111").await
//! # }
//! ```

pub mod config;
mod datagram;
mod dispatch;
pub mod error;
mod property;
pub mod server;
mod stream;
mod watchdog;

pub use config::{
    AuthConfig, HeartbeatConfig, ServerConfig, DEFAULT_AUTH_MESSAGE_ID, DEFAULT_DATAGRAM_BUFFER,
    DEFAULT_HEARTBEAT_MESSAGE_ID, DEFAULT_MAX_PIPELINE, DEFAULT_REPLY_QUEUE,
};
pub use error::{Result, ServerError};
pub use server::{ConnectionHook, Server, ServerBuilder};
