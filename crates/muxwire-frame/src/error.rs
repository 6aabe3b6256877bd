/// Errors that can occur during block encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The source ended part-way through a block.
    #[error("truncated block (expected {expected} bytes, got {actual})")]
    Truncated { expected: usize, actual: usize },

    /// The declared frame length exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A pipeline head announces more follow-up blocks than allowed.
    #[error("pipeline too long ({count} blocks, max {max})")]
    PipelineTooLong { count: usize, max: usize },

    /// The declared lengths do not fit the bytes actually available.
    #[error("malformed block: {0}")]
    Malformed(String),

    /// The header segment is not a JSON object.
    #[error("header JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The body marshaller failed.
    #[error("{marshaller} marshaller error: {reason}")]
    Marshal {
        marshaller: &'static str,
        reason: String,
    },

    /// No marshaller is registered under this name.
    #[error("unknown marshaller '{0}'")]
    UnknownMarshaller(String),

    /// A recognised encoding with no built-in marshaller. Pack its bodies
    /// pre-encoded with `pack_raw`.
    #[error("marshaller '{0}' is not built in; send pre-encoded bodies instead")]
    ExternalMarshaller(&'static str),

    /// The header carries a key reserved for routing/pipelining.
    #[error("header key '{0}' is reserved")]
    ReservedHeader(String),

    /// An I/O error occurred while reading or writing blocks.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
