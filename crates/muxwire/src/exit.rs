use std::fmt;
use std::io;

use muxwire_frame::FrameError;
use muxwire_server::ServerError;
use muxwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::UnknownNetwork(_) | TransportError::WrongKind { .. } => {
            CliError::usage(format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ReservedHeader(_)
        | FrameError::UnknownMarshaller(_)
        | FrameError::ExternalMarshaller(_) => {
            CliError::usage(format!("{context}: {err}"))
        }
        FrameError::Truncated { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::FrameTooLarge { .. }
        | FrameError::PipelineTooLong { .. }
        | FrameError::Malformed(_)
        | FrameError::Json(_)
        | FrameError::Marshal { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

pub fn server_error(context: &str, err: ServerError) -> CliError {
    match err {
        ServerError::Transport(err) => transport_error(context, err),
        ServerError::Frame(err) => frame_error(context, err),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_error_kind() {
        let err = io_error("connect", io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(err.code, TIMEOUT);

        let err = transport_error("bind", TransportError::UnknownNetwork("http".into()));
        assert_eq!(err.code, USAGE);
        assert!(err.message.starts_with("bind: "));

        let err = frame_error("decode", FrameError::Malformed("short".into()));
        assert_eq!(err.code, DATA_INVALID);

        let err = server_error("start", ServerError::AlreadyRunning);
        assert_eq!(err.code, INTERNAL);
    }
}
