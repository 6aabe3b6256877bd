use muxwire_frame::FrameError;
use muxwire_router::RouterError;
use muxwire_transport::TransportError;

/// Errors that can occur while configuring or running a server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Registration problem found while building the server.
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("server is already running")]
    AlreadyRunning,

    /// Another `start` call is still rebinding listeners.
    #[error("server is already starting")]
    Starting,

    #[error("server is already stopped")]
    AlreadyStopped,

    /// `start` was called before any listener was ever bound.
    #[error("no listeners to start; call listen_and_serve first")]
    NoListeners,
}

pub type Result<T> = std::result::Result<T, ServerError>;
