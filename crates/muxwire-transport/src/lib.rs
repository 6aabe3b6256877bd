//! Transport layer for muxwire.
//!
//! Binds the listeners a server accepts on and the blocking client sockets
//! tools use to talk to it:
//! - TCP (`tcp`, `tcp4`, `tcp6`) and Unix domain sockets (`unix`) as byte streams
//! - UDP (`udp`, `udp4`, `udp6`) as datagrams
//!
//! `kcp` is recognised by name but not served.

pub mod client;
pub mod datagram;
pub mod error;
pub mod listener;
pub mod network;

#[cfg(unix)]
mod unix;

pub use client::{connect_datagram, ClientStream};
pub use datagram::DatagramSocket;
pub use error::{Result, TransportError};
pub use listener::{AsyncStream, BoxedStream, StreamListener};
pub use network::{Network, TransportKind};
