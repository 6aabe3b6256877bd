//! Registration-order activation ranges for keyed middleware.
//!
//! Every handler registration takes the next value of one monotonic counter,
//! its anchor index. `use_middleware(key)` opens a range at the current counter
//! value and `unuse(key)` closes it at the current counter value, so a closed
//! range `[start, end)` covers exactly the handlers registered in between. An
//! open range covers every handler registered after it, with no upper bound.

use std::fmt::Write as _;
use std::panic::Location;

use crate::error::{Result, RouterError};
use crate::router::HandlerFn;

/// Activation history of one keyed middleware.
pub struct MiddlewareAnchor {
    key: String,
    middleware: HandlerFn,
    starts: Vec<usize>,
    ends: Vec<usize>,
    use_sites: Vec<&'static Location<'static>>,
    unuse_sites: Vec<&'static Location<'static>>,
}

impl MiddlewareAnchor {
    pub(crate) fn new(key: String, middleware: HandlerFn) -> Self {
        Self {
            key,
            middleware,
            starts: Vec::new(),
            ends: Vec::new(),
            use_sites: Vec::new(),
            unuse_sites: Vec::new(),
        }
    }

    pub(crate) fn record_use(&mut self, index: usize, site: &'static Location<'static>) {
        if self.is_open() {
            tracing::warn!(
                key = %self.key,
                %site,
                "use_middleware called again before unuse; registration will fail validation"
            );
        }
        self.starts.push(index);
        self.use_sites.push(site);
    }

    pub(crate) fn record_unuse(&mut self, index: usize, site: &'static Location<'static>) {
        if !self.is_open() {
            tracing::warn!(
                key = %self.key,
                %site,
                "unuse called without a matching use_middleware; registration will fail validation"
            );
        }
        self.ends.push(index);
        self.unuse_sites.push(site);
    }

    pub(crate) fn replace_middleware(&mut self, middleware: HandlerFn) {
        self.middleware = middleware;
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn middleware(&self) -> &HandlerFn {
        &self.middleware
    }

    /// Range starts, in call order.
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    /// Exclusive range ends, in call order.
    pub fn ends(&self) -> &[usize] {
        &self.ends
    }

    /// True while a `use` has no matching `unuse`.
    pub fn is_open(&self) -> bool {
        self.starts.len() > self.ends.len()
    }

    /// Whether the handler registered at `index` runs this middleware.
    pub fn contains(&self, index: usize) -> bool {
        let in_closed = self
            .starts
            .iter()
            .zip(&self.ends)
            .any(|(&start, &end)| start <= index && index < end);
        if in_closed {
            return true;
        }
        self.is_open() && self.starts.last().is_some_and(|&start| index >= start)
    }

    /// Fails unless `starts - ends` is 0 or 1.
    pub fn check_valid(&self) -> Result<()> {
        let starts = self.starts.len();
        let ends = self.ends.len();
        if starts == ends || starts == ends + 1 {
            return Ok(());
        }
        Err(RouterError::UnbalancedAnchor {
            key: self.key.clone(),
            starts,
            ends,
            sites: self.format_sites(),
        })
    }

    /// Where `use`/`unuse` were called for this key.
    pub fn format_sites(&self) -> String {
        let mut out = String::from("------------------- use -------------------\n");
        for site in &self.use_sites {
            let _ = writeln!(out, "{site}");
        }
        out.push_str("------------------ unuse ------------------\n");
        for site in &self.unuse_sites {
            let _ = writeln!(out, "{site}");
        }
        out
    }
}

impl std::fmt::Debug for MiddlewareAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareAnchor")
            .field("key", &self.key)
            .field("starts", &self.starts)
            .field("ends", &self.ends)
            .finish_non_exhaustive()
    }
}
