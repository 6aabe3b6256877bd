use muxwire_frame::FrameError;

/// Errors raised while registering routes or handling a request.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A handler is already registered for this message id or URL pattern.
    #[error("duplicate route: {0} already has a handler")]
    DuplicateRoute(String),

    /// `unuse` named a middleware key that was never `use`d.
    #[error("middleware '{0}' was never registered with use_middleware")]
    UnknownMiddleware(String),

    /// `use`/`unuse` calls for a key are not balanced.
    #[error("middleware '{key}' has {starts} use and {ends} unuse calls; registered at:\n{sites}")]
    UnbalancedAnchor {
        key: String,
        starts: usize,
        ends: usize,
        sites: String,
    },

    /// The connection has no client pool to register with.
    #[error("client pool is not enabled")]
    PoolDisabled,

    /// No live connection is registered under this username.
    #[error("user '{0}' is not online")]
    UnknownUser(String),

    /// The connection was closed and can no longer send.
    #[error("connection {0} is closed")]
    Closed(u64),

    /// The peer stopped reading and the reply queue filled up. The connection
    /// is closed.
    #[error("connection {0} reply queue is full")]
    ReplyQueueFull(u64),

    /// Encoding or decoding a block failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, RouterError>;
