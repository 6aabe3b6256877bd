//! Length-prefixed message framing, anchored middleware routing and a
//! multi-transport server.
//!
//! muxwire multiplexes request/response exchanges over long-lived TCP, Unix
//! and UDP connections. Handlers are registered by numeric message id or URL
//! pattern and composed with global, anchored and per-route middleware.
//!
//! # Crate Structure
//!
//! - [`transport`]: bound listeners, datagram sockets and blocking clients
//! - [`frame`]: the block codec, marshallers and blocking frame reader/writer
//! - [`router`]: middleware anchors, the router and per-request context (`router` feature)
//! - [`server`]: server lifecycle and connection watchdogs (`server` feature)

/// Re-export transport types.
pub mod transport {
    pub use muxwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use muxwire_frame::*;
}

/// Re-export router types (requires `router` feature).
#[cfg(feature = "router")]
pub mod router {
    pub use muxwire_router::*;
}

/// Re-export server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use muxwire_server::*;
}

pub use muxwire_frame::{Marshaller, Message, Packer};
#[cfg(feature = "router")]
pub use muxwire_router::{Context, Router};
#[cfg(feature = "server")]
pub use muxwire_server::Server;
