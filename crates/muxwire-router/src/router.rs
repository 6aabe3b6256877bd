use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use bytes::Bytes;
use muxwire_frame::{codec, Route};
use tracing::{debug, warn};

use crate::anchor::MiddlewareAnchor;
use crate::connection::Connection;
use crate::context::Context;
use crate::error::{Result, RouterError};

/// Handler and middleware signature.
pub type HandlerFn = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Wrap a closure as a [`HandlerFn`].
pub fn handler<F>(f: F) -> HandlerFn
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// What a registered route is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteKey {
    MessageId(i32),
    UrlPattern(String),
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKey::MessageId(id) => write!(f, "message id {id}"),
            RouteKey::UrlPattern(pattern) => write!(f, "url pattern '{pattern}'"),
        }
    }
}

/// Diagnostic view of one registered route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub key: RouteKey,
    pub anchor_index: usize,
    pub self_middleware: usize,
    pub through_middleware: bool,
}

struct Registration {
    handler: HandlerFn,
    anchor_index: usize,
    self_middleware: Vec<HandlerFn>,
    through_middleware: bool,
}

/// Outcome of dispatching one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The chain ran to completion.
    Completed,
    /// A handler called `abort`.
    Aborted,
    /// No handler matched; the block was dropped.
    Unrouted,
}

/// Handler registry and middleware resolution.
///
/// Routes are registered through `&mut self` before serving; the server then
/// shares the router behind an `Arc`, so the registry is read-only while
/// requests are dispatched.
///
/// Chain order for a routed request: global middleware, then every anchored
/// middleware whose range covers the handler's anchor index (in the order the
/// keys were first used), then the handler's own middleware, then the handler.
#[derive(Default)]
pub struct Router {
    counter: usize,
    by_id: HashMap<i32, Registration>,
    by_pattern: HashMap<String, Registration>,
    globals: Vec<HandlerFn>,
    anchors: Vec<MiddlewareAnchor>,
    anchor_keys: HashMap<String, usize>,
    on_message: Option<HandlerFn>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `message_id` to `f`.
    pub fn add_handler<F>(&mut self, message_id: i32, f: F) -> Result<usize>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.add_handler_with(message_id, Vec::new(), f)
    }

    /// Route `message_id` to `f`, preceded by middleware scoped to this handler only.
    pub fn add_handler_with<F>(
        &mut self,
        message_id: i32,
        middleware: Vec<HandlerFn>,
        f: F,
    ) -> Result<usize>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.register(RouteKey::MessageId(message_id), middleware, handler(f), true)
    }

    /// Route `message_id` to `f` alone, skipping every middleware.
    pub fn add_bare_handler(&mut self, message_id: i32, f: HandlerFn) -> Result<usize> {
        self.register(RouteKey::MessageId(message_id), Vec::new(), f, false)
    }

    /// Route a URL pattern (exact match) to `f`.
    pub fn any<F>(&mut self, pattern: &str, f: F) -> Result<usize>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.any_with(pattern, Vec::new(), f)
    }

    pub fn any_with<F>(&mut self, pattern: &str, middleware: Vec<HandlerFn>, f: F) -> Result<usize>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.register(
            RouteKey::UrlPattern(pattern.to_string()),
            middleware,
            handler(f),
            true,
        )
    }

    /// Run `f` for every request, before anything else.
    pub fn use_global<F>(&mut self, f: F)
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.globals.push(handler(f));
    }

    /// Activate middleware `key` for handlers registered from now on.
    ///
    /// Using a key again after [`Router::unuse`] opens a new range and replaces
    /// the middleware function.
    #[track_caller]
    pub fn use_middleware<F>(&mut self, key: &str, f: F)
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        let site = Location::caller();
        let index = self.counter;
        match self.anchor_keys.get(key) {
            Some(&slot) => {
                let anchor = &mut self.anchors[slot];
                anchor.replace_middleware(handler(f));
                anchor.record_use(index, site);
            }
            None => {
                let mut anchor = MiddlewareAnchor::new(key.to_string(), handler(f));
                anchor.record_use(index, site);
                self.anchor_keys.insert(key.to_string(), self.anchors.len());
                self.anchors.push(anchor);
            }
        }
        debug!(key, anchor_index = index, "middleware activated");
    }

    /// Deactivate middleware `key` for handlers registered from now on.
    #[track_caller]
    pub fn unuse(&mut self, key: &str) -> Result<()> {
        let site = Location::caller();
        let slot = *self
            .anchor_keys
            .get(key)
            .ok_or_else(|| RouterError::UnknownMiddleware(key.to_string()))?;
        self.anchors[slot].record_unuse(self.counter, site);
        debug!(key, anchor_index = self.counter, "middleware deactivated");
        Ok(())
    }

    /// Raw mode: bypass routing and send every request through global
    /// middleware, every anchored middleware and then `f`.
    pub fn on_message<F>(&mut self, f: F)
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.on_message = Some(handler(f));
    }

    pub fn has_on_message(&self) -> bool {
        self.on_message.is_some()
    }

    /// Fail if any middleware key has unbalanced `use`/`unuse` calls.
    pub fn check_valid_before_run(&self) -> Result<()> {
        self.anchors.iter().try_for_each(MiddlewareAnchor::check_valid)
    }

    pub fn anchor(&self, key: &str) -> Option<&MiddlewareAnchor> {
        self.anchor_keys.get(key).map(|&slot| &self.anchors[slot])
    }

    pub fn anchor_index_of(&self, key: &RouteKey) -> Option<usize> {
        self.registration(key).map(|r| r.anchor_index)
    }

    /// Registered routes ordered by anchor index.
    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut routes: Vec<RouteInfo> = self
            .by_id
            .iter()
            .map(|(id, r)| info(RouteKey::MessageId(*id), r))
            .chain(
                self.by_pattern
                    .iter()
                    .map(|(p, r)| info(RouteKey::UrlPattern(p.clone()), r)),
            )
            .collect();
        routes.sort_by_key(|r| r.anchor_index);
        routes
    }

    /// Resolve the handler chain for a block, or `None` if nothing matches.
    ///
    /// Missing or malformed routing metadata falls back to message-id routing.
    pub fn resolve(&self, block: &[u8]) -> Option<Vec<HandlerFn>> {
        if let Some(on_message) = &self.on_message {
            let mut chain = self.globals.clone();
            chain.extend(self.anchors.iter().map(|a| Arc::clone(a.middleware())));
            chain.push(Arc::clone(on_message));
            return Some(chain);
        }

        let route = match codec::route_of(block) {
            Ok(route) => route,
            Err(e) => {
                warn!(error = %e, "unreadable header, routing by message id");
                Route::MessageId
            }
        };
        let key = match route {
            Route::UrlPattern(pattern) => RouteKey::UrlPattern(pattern),
            Route::MessageId => match codec::message_id_of(block) {
                Ok(id) => RouteKey::MessageId(id),
                Err(e) => {
                    warn!(error = %e, "malformed block, dropping request");
                    return None;
                }
            },
        };

        match self.registration(&key) {
            Some(registration) => Some(self.chain_for(registration)),
            None => {
                warn!(route = %key, "no handler registered, dropping request");
                None
            }
        }
    }

    /// Resolve and run the chain for one request on `conn`.
    pub fn dispatch(&self, conn: Arc<Connection>, block: Bytes) -> Dispatch {
        let Some(chain) = self.resolve(&block) else {
            return Dispatch::Unrouted;
        };
        let mut ctx = Context::new(conn, block, chain);
        ctx.next();
        if ctx.is_aborted() {
            Dispatch::Aborted
        } else {
            Dispatch::Completed
        }
    }

    fn chain_for(&self, registration: &Registration) -> Vec<HandlerFn> {
        if !registration.through_middleware {
            return vec![Arc::clone(&registration.handler)];
        }
        let index = registration.anchor_index;
        let mut chain = self.globals.clone();
        chain.extend(
            self.anchors
                .iter()
                .filter(|a| a.contains(index))
                .map(|a| Arc::clone(a.middleware())),
        );
        chain.extend(registration.self_middleware.iter().cloned());
        chain.push(Arc::clone(&registration.handler));
        chain
    }

    fn registration(&self, key: &RouteKey) -> Option<&Registration> {
        match key {
            RouteKey::MessageId(id) => self.by_id.get(id),
            RouteKey::UrlPattern(pattern) => self.by_pattern.get(pattern),
        }
    }

    fn register(
        &mut self,
        key: RouteKey,
        self_middleware: Vec<HandlerFn>,
        handler: HandlerFn,
        through_middleware: bool,
    ) -> Result<usize> {
        if self.registration(&key).is_some() {
            return Err(RouterError::DuplicateRoute(key.to_string()));
        }
        let anchor_index = self.counter;
        self.counter += 1;
        let registration = Registration {
            handler,
            anchor_index,
            self_middleware,
            through_middleware,
        };
        debug!(route = %key, anchor_index, "handler registered");
        match key {
            RouteKey::MessageId(id) => {
                self.by_id.insert(id, registration);
            }
            RouteKey::UrlPattern(pattern) => {
                self.by_pattern.insert(pattern, registration);
            }
        }
        Ok(anchor_index)
    }
}

fn info(key: RouteKey, r: &Registration) -> RouteInfo {
    RouteInfo {
        key,
        anchor_index: r.anchor_index,
        self_middleware: r.self_middleware.len(),
        through_middleware: r.through_middleware,
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes())
            .field("globals", &self.globals.len())
            .field("anchors", &self.anchors)
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}
