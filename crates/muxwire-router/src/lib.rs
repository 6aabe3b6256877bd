//! Routing and middleware dispatch for muxwire.
//!
//! A [`Router`] maps message ids and URL patterns to handlers and decides which
//! middleware wraps each one. Keyed middleware is scoped by registration
//! order: see [`anchor`] for the activation-range rules.
//!
//! Each request runs in its own [`Context`], built fresh from the shared
//! [`Connection`] so concurrent requests on one connection never share a
//! dispatch cursor.

pub mod anchor;
pub mod connection;
pub mod context;
pub mod error;
pub mod pool;
pub mod router;
pub mod store;

pub use anchor::MiddlewareAnchor;
pub use connection::{AuthState, Connection, ReplySink};
pub use context::Context;
pub use error::{Result, RouterError};
pub use pool::ClientPool;
pub use router::{handler, Dispatch, HandlerFn, RouteInfo, RouteKey, Router};
pub use store::Store;
