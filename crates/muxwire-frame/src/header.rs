//! Header map type and the keys reserved for routing and pipelining.

use serde_json::{Map, Value};

use crate::error::{FrameError, Result};

/// Block header: a string-keyed JSON object.
///
/// Always serialized as JSON regardless of the body marshaller, so routing
/// metadata can be read without knowing how the body is encoded.
pub type Header = Map<String, Value>;

/// Selects message-id or URL-pattern routing.
pub const ROUTER_TYPE: &str = "Router-Type";

/// URL pattern value, read when [`ROUTER_TYPE`] is `URL_PATTERN`.
pub const ROUTER_PATTERN_VALUE: &str = "Router-Pattern-Value";

/// Pipelining directive: `"enable;<N>"` means N more blocks follow atomically.
pub const PIPE: &str = "Pipe";

/// Every key user code may not set itself.
pub const RESERVED_KEYS: [&str; 3] = [ROUTER_TYPE, ROUTER_PATTERN_VALUE, PIPE];

const ROUTE_MESSAGE_ID: &str = "MESSAGE_ID";
const ROUTE_URL_PATTERN: &str = "URL_PATTERN";
const PIPE_ENABLE_PREFIX: &str = "enable;";

/// How a block is routed, as declared by its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    MessageId,
    UrlPattern(String),
}

impl Route {
    /// Read the routing discriminator from a header.
    ///
    /// Missing or malformed routing metadata falls back to message-id routing.
    pub fn of(header: &Header) -> Self {
        match header.get(ROUTER_TYPE).and_then(Value::as_str) {
            Some(ROUTE_URL_PATTERN) => match header.get(ROUTER_PATTERN_VALUE) {
                Some(Value::String(pattern)) if !pattern.is_empty() => {
                    Route::UrlPattern(pattern.clone())
                }
                _ => {
                    tracing::warn!("URL_PATTERN routing without a pattern value, using message id");
                    Route::MessageId
                }
            },
            Some(ROUTE_MESSAGE_ID) | None => Route::MessageId,
            Some(other) => {
                tracing::warn!(router_type = other, "unknown router type, using message id");
                Route::MessageId
            }
        }
    }
}

/// True if `key` is reserved for internal use.
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Reject a user-supplied header carrying any reserved key.
pub fn check_user_header(header: &Header) -> Result<()> {
    match header.keys().find(|k| is_reserved(k)) {
        Some(key) => Err(FrameError::ReservedHeader(key.clone())),
        None => Ok(()),
    }
}

/// Merge headers left to right; later keys overwrite earlier ones.
pub fn merge<'a, I>(headers: I) -> Header
where
    I: IntoIterator<Item = &'a Header>,
{
    let mut merged = Header::new();
    for header in headers {
        for (k, v) in header {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// Mark `header` as routed by URL pattern.
pub fn set_url_pattern(header: &mut Header, pattern: &str) {
    header.insert(ROUTER_TYPE.to_string(), Value::from(ROUTE_URL_PATTERN));
    header.insert(ROUTER_PATTERN_VALUE.to_string(), Value::from(pattern));
}

/// Mark `header` as the head of a pipeline of `follow` further blocks.
pub fn set_pipe(header: &mut Header, follow: usize) {
    header.insert(PIPE.to_string(), Value::from(format!("{PIPE_ENABLE_PREFIX}{follow}")));
}

/// Number of blocks that follow this one in a pipeline, if any.
///
/// Anything other than `"enable;<N>"` with N ≥ 1 is ignored.
pub fn pipe_of(header: &Header) -> Option<usize> {
    let value = header.get(PIPE)?.as_str()?;
    let count = value.strip_prefix(PIPE_ENABLE_PREFIX)?.trim().parse::<usize>().ok()?;
    (count > 0).then_some(count)
}
