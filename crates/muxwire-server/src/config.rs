use std::time::Duration;

use muxwire_frame::{Marshaller, DEFAULT_MAX_FRAME};

/// Default receive buffer for one datagram: 64 KiB.
pub const DEFAULT_DATAGRAM_BUFFER: usize = 64 * 1024;

/// Default cap on the follow-up blocks one pipeline head may announce.
pub const DEFAULT_MAX_PIPELINE: usize = 64;

/// Default number of replies queued per connection (and per datagram socket)
/// before the peer is treated as not reading.
pub const DEFAULT_REPLY_QUEUE: usize = 1024;

/// Message id heartbeats are sent with unless configured otherwise.
pub const DEFAULT_HEARTBEAT_MESSAGE_ID: i32 = 1392;

/// Message id auth requests are sent with unless configured otherwise.
pub const DEFAULT_AUTH_MESSAGE_ID: i32 = 1393;

/// Server-wide settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Body marshaller for every connection. Default: JSON.
    pub marshaller: Marshaller,
    /// Largest accepted frame length. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Most follow-up blocks a `Pipe: enable;N` head may announce. A larger
    /// N closes the connection as a framing error. Default: 64.
    pub max_pipeline: usize,
    /// Replies queued per connection, or per datagram socket. When full, the
    /// reply fails and a stream connection is closed. Default: 1024.
    pub reply_queue_size: usize,
    /// Receive buffer per datagram. Default: 64 KiB.
    pub datagram_buffer_size: usize,
    /// Keep a username → connection registry for `online`/`send_to_username`.
    pub builtin_pool: bool,
    /// Close connections on `stop(true)` through a broadcast signal every
    /// connection watches, instead of walking the client pool.
    pub broadcast_close: bool,
}

impl ServerConfig {
    /// Reply queue capacity; a zero setting is treated as one.
    pub(crate) fn reply_queue(&self) -> usize {
        self.reply_queue_size.max(1)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            marshaller: Marshaller::Json,
            max_frame_size: DEFAULT_MAX_FRAME,
            max_pipeline: DEFAULT_MAX_PIPELINE,
            reply_queue_size: DEFAULT_REPLY_QUEUE,
            datagram_buffer_size: DEFAULT_DATAGRAM_BUFFER,
            builtin_pool: false,
            broadcast_close: false,
        }
    }
}

/// Heartbeat supervision for stream connections.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Expected time between heartbeats. Default: 10 seconds.
    pub interval: Duration,
    pub message_id: i32,
    /// Run global and anchored middleware before the heartbeat handler.
    pub through_middleware: bool,
    /// Consecutive missed intervals before the connection is closed. Default: 3.
    pub max_misses: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            message_id: DEFAULT_HEARTBEAT_MESSAGE_ID,
            through_middleware: false,
            max_misses: 3,
        }
    }
}

/// Auth deadline for stream connections.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Time a new connection has to call `auth_pass`. Default: 10 seconds.
    pub deadline: Duration,
    pub message_id: i32,
    pub through_middleware: bool,
    /// Sent (JSON string body, auth message id) before closing a denied or
    /// timed-out connection.
    pub deny_message: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(10),
            message_id: DEFAULT_AUTH_MESSAGE_ID,
            through_middleware: false,
            deny_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.marshaller, Marshaller::Json);
        assert_eq!(server.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(server.max_pipeline, 64);
        assert_eq!(server.reply_queue_size, 1024);
        assert!(!server.builtin_pool && !server.broadcast_close);

        let hb = HeartbeatConfig::default();
        assert_eq!(hb.message_id, 1392);
        assert_eq!(hb.max_misses, 3);
        assert!(!hb.through_middleware);

        let auth = AuthConfig::default();
        assert_eq!(auth.deadline, Duration::from_secs(10));
        assert!(auth.deny_message.is_none());
    }
}
