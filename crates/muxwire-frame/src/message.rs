use serde_json::Value;

use crate::header::{Header, Route};

/// One logical request or response.
///
/// `body` is `None` when the block carried a zero-length body segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<B = Value> {
    pub id: i32,
    pub header: Header,
    pub body: Option<B>,
}

impl<B> Message<B> {
    pub fn new(id: i32, body: B) -> Self {
        Self {
            id,
            header: Header::new(),
            body: Some(body),
        }
    }

    /// A message with no body segment.
    pub fn empty(id: i32) -> Self {
        Self {
            id,
            header: Header::new(),
            body: None,
        }
    }

    /// Add a header entry.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.header.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.header.insert(key.into(), value.into());
    }

    /// Routing discriminator declared by the header.
    pub fn route(&self) -> Route {
        Route::of(&self.header)
    }
}
