use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use muxwire_frame::Marshaller;
use muxwire_router::{handler, ClientPool, Connection, Context, HandlerFn, Router};
use muxwire_transport::{DatagramSocket, Network, StreamListener, TransportKind};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{AuthConfig, HeartbeatConfig, ServerConfig};
use crate::error::{Result, ServerError};
use crate::property::{ListenerProperty, PropertyCache};
use crate::{datagram, stream, watchdog};

/// Callback run when a stream connection opens or closes.
pub type ConnectionHook = Arc<dyn Fn(&Arc<Connection>) + Send + Sync>;

type ExitHook = Box<dyn Fn() + Send + Sync>;

/// Collects configuration, hooks and the router, then builds a [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    heartbeat: Option<(HeartbeatConfig, HandlerFn)>,
    auth: Option<(AuthConfig, HandlerFn)>,
    on_connect: Option<ConnectionHook>,
    on_close: Option<ConnectionHook>,
    before_exit: Vec<ExitHook>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            heartbeat: None,
            auth: None,
            on_connect: None,
            on_close: None,
            before_exit: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_marshaller(mut self, marshaller: Marshaller) -> Self {
        self.config.marshaller = marshaller;
        self
    }

    pub fn with_builtin_pool(mut self, enabled: bool) -> Self {
        self.config.builtin_pool = enabled;
        self
    }

    pub fn with_broadcast_close(mut self, enabled: bool) -> Self {
        self.config.broadcast_close = enabled;
        self
    }

    /// Supervise heartbeats; the default handler records each heartbeat.
    pub fn heartbeat_mode(self, config: HeartbeatConfig) -> Self {
        self.heartbeat_mode_with(config, |c| c.recv_heartbeat())
    }

    /// Supervise heartbeats with a custom handler. It must call
    /// [`Context::recv_heartbeat`] for the heartbeat to count.
    pub fn heartbeat_mode_with<F>(mut self, config: HeartbeatConfig, f: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.heartbeat = Some((config, handler(f)));
        self
    }

    /// Require auth: `f` handles the auth message and calls
    /// [`Context::auth_pass`] or [`Context::auth_deny`].
    pub fn with_auth<F>(mut self, config: AuthConfig, f: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.auth = Some((config, handler(f)));
        self
    }

    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(f));
        self
    }

    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(f));
        self
    }

    /// Cleanup run synchronously by [`Server::shutdown`].
    pub fn before_exit<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.before_exit.push(Box::new(f));
        self
    }

    /// Register heartbeat/auth routes, validate middleware nesting and freeze the router.
    pub fn build(self, mut router: Router) -> Result<Server> {
        let heartbeat = match self.heartbeat {
            Some((config, h)) => {
                register(&mut router, config.message_id, config.through_middleware, h)?;
                Some(config)
            }
            None => None,
        };
        let auth = match self.auth {
            Some((config, h)) => {
                register(&mut router, config.message_id, config.through_middleware, h)?;
                Some(config)
            }
            None => None,
        };
        router.check_valid_before_run()?;

        let pool = self.config.builtin_pool.then(|| Arc::new(ClientPool::new()));
        let shared = Shared {
            router,
            config: self.config,
            heartbeat,
            auth,
            pool,
            on_connect: self.on_connect,
            on_close: self.on_close,
            next_conn_id: AtomicU64::new(1),
            close_all: Mutex::new(CancellationToken::new()),
        };
        Ok(Server {
            inner: Arc::new(ServerInner {
                shared: Arc::new(shared),
                state: Mutex::new(State::Stopped),
                properties: PropertyCache::default(),
                before_exit: self.before_exit,
            }),
        })
    }
}

fn register(router: &mut Router, message_id: i32, through_middleware: bool, h: HandlerFn) -> Result<()> {
    if through_middleware {
        router.add_handler(message_id, move |c| h(c))?;
    } else {
        router.add_bare_handler(message_id, h)?;
    }
    Ok(())
}

/// State every accept loop and connection task reads.
pub(crate) struct Shared {
    pub(crate) router: Router,
    pub(crate) config: ServerConfig,
    pub(crate) heartbeat: Option<HeartbeatConfig>,
    pub(crate) auth: Option<AuthConfig>,
    pub(crate) pool: Option<Arc<ClientPool>>,
    on_connect: Option<ConnectionHook>,
    on_close: Option<ConnectionHook>,
    next_conn_id: AtomicU64,
    close_all: Mutex<CancellationToken>,
}

impl Shared {
    pub(crate) fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn pool_ref(&self) -> Weak<ClientPool> {
        self.pool.as_ref().map(Arc::downgrade).unwrap_or_default()
    }

    /// Spawn the watchdogs configured for a new stream connection.
    pub(crate) fn spawn_watchdogs(&self, conn: &Arc<Connection>) {
        if let Some(config) = &self.heartbeat {
            tokio::spawn(watchdog::heartbeat(Arc::clone(conn), config.clone()));
        }
        if let Some(config) = &self.auth {
            tokio::spawn(watchdog::auth(Arc::clone(conn), config.clone()));
        }
        if self.config.broadcast_close {
            let close_all = self.close_all.lock().clone();
            tokio::spawn(watchdog::broadcast_close(Arc::clone(conn), close_all));
        }
    }

    pub(crate) async fn run_on_connect(&self, conn: &Arc<Connection>) {
        if let Some(hook) = &self.on_connect {
            run_hook(Arc::clone(hook), Arc::clone(conn), "on_connect").await;
        }
    }

    pub(crate) async fn run_on_close(&self, conn: &Arc<Connection>) {
        if let Some(hook) = &self.on_close {
            run_hook(Arc::clone(hook), Arc::clone(conn), "on_close").await;
        }
    }

    fn close_all_connections(&self) {
        if self.config.broadcast_close {
            let previous = std::mem::take(&mut *self.close_all.lock());
            previous.cancel();
        } else if let Some(pool) = &self.pool {
            pool.close_all();
        } else {
            warn!("close-all requested without broadcast_close or a client pool; open connections are left running");
        }
    }
}

async fn run_hook(hook: ConnectionHook, conn: Arc<Connection>, name: &'static str) {
    let conn_id = conn.id();
    if let Err(e) = tokio::task::spawn_blocking(move || hook(&conn)).await {
        if e.is_panic() {
            tracing::error!(conn_id, hook = name, "connection hook panicked");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Stopped,
    /// `start` is rebinding cached listeners.
    Starting,
    Running,
}

struct ServerInner {
    shared: Arc<Shared>,
    state: Mutex<State>,
    properties: PropertyCache,
    before_exit: Vec<ExitHook>,
}

/// A running (or stoppable and restartable) muxwire server.
///
/// Cheap to clone; clones control the same server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

enum Bound {
    Stream(StreamListener),
    Datagram(DatagramSocket),
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Bind `network`/`addr` and serve until the listener is stopped.
    pub async fn listen_and_serve(&self, network: &str, addr: &str) -> Result<()> {
        let network: Network = network.parse()?;
        let (bound, property) = self.bind(network, addr).await?;
        self.mark_running();
        self.serve(bound, property).await;
        Ok(())
    }

    /// Bind `network`/`addr`, serve in a background task and return the
    /// resolved local address.
    pub async fn spawn(&self, network: &str, addr: &str) -> Result<String> {
        let network: Network = network.parse()?;
        let (bound, property) = self.bind(network, addr).await?;
        self.mark_running();
        let local = property.addr.clone();
        let server = self.clone();
        tokio::spawn(async move { server.serve(bound, property).await });
        Ok(local)
    }

    /// Stop every listener. With `close_all`, also close every live connection.
    pub fn stop(&self, close_all: bool) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state == State::Stopped {
                return Err(ServerError::AlreadyStopped);
            }
            *state = State::Stopped;
        }
        self.inner.properties.stop_all();
        if close_all {
            self.inner.shared.close_all_connections();
        }
        info!(close_all, "server stopped");
        Ok(())
    }

    /// Rebind every listener from the property cache and serve again.
    ///
    /// If a rebind fails, the listeners not yet restarted go back into the
    /// cache so a later `start` (or `restart`, once any listener is running)
    /// can retry them.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                State::Running => return Err(ServerError::AlreadyRunning),
                State::Starting => return Err(ServerError::Starting),
                State::Stopped => {}
            }
            if self.inner.properties.is_empty() {
                return Err(ServerError::NoListeners);
            }
            *state = State::Starting;
        }

        let previous = self.inner.properties.take_all();
        for property in &previous {
            property.stop.cancel();
            property.finished.cancelled().await;
        }

        let mut started = 0;
        let mut pending = previous.into_iter();
        while let Some(property) = pending.next() {
            match self.bind(property.network, &property.addr).await {
                Ok((bound, fresh)) => {
                    let server = self.clone();
                    tokio::spawn(async move { server.serve(bound, fresh).await });
                    started += 1;
                }
                Err(e) => {
                    warn!(network = %property.network, addr = %property.addr, error = %e, "rebind failed");
                    self.inner.properties.restore(std::iter::once(property).chain(pending));
                    let live = !self.inner.properties.addrs().is_empty();
                    self.finish_start(live);
                    return Err(e);
                }
            }
        }
        self.finish_start(true);
        info!(listeners = started, "server started");
        Ok(())
    }

    /// Stop, run `hook`, then start again.
    pub async fn restart<F: FnOnce()>(&self, close_all: bool, hook: F) -> Result<()> {
        self.stop(close_all)?;
        hook();
        self.start().await
    }

    /// Stop (closing every connection) and run the `before_exit` callbacks.
    pub fn shutdown(&self) {
        match self.stop(true) {
            Ok(()) | Err(ServerError::AlreadyStopped) => {}
            Err(e) => warn!(error = %e, "stop during shutdown failed"),
        }
        for hook in &self.inner.before_exit {
            hook();
        }
        info!("server shut down");
    }

    pub fn is_running(&self) -> bool {
        *self.inner.state.lock() == State::Running
    }

    /// Resolved addresses of the listeners currently serving.
    pub fn local_addrs(&self) -> Vec<(Network, String)> {
        self.inner.properties.addrs()
    }

    pub fn pool(&self) -> Option<&Arc<ClientPool>> {
        self.inner.shared.pool.as_ref()
    }

    pub fn router(&self) -> &Router {
        &self.inner.shared.router
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.shared.config
    }

    fn mark_running(&self) {
        let mut state = self.inner.state.lock();
        if *state == State::Stopped {
            *state = State::Running;
        }
    }

    /// Leave the `Starting` state. A `stop` that raced the start wins: the
    /// listeners bound meanwhile are stopped too.
    fn finish_start(&self, running: bool) {
        let mut state = self.inner.state.lock();
        match *state {
            State::Starting => {
                *state = if running { State::Running } else { State::Stopped };
            }
            State::Stopped => self.inner.properties.stop_all(),
            State::Running => {}
        }
    }

    async fn bind(&self, network: Network, addr: &str) -> Result<(Bound, ListenerProperty)> {
        let (bound, local) = match network.kind() {
            TransportKind::Stream => {
                let listener = StreamListener::bind(network, addr).await?;
                let local = listener.local_addr().to_string();
                (Bound::Stream(listener), local)
            }
            TransportKind::Datagram => {
                let socket = DatagramSocket::bind(network, addr).await?;
                let local = socket.local_addr().to_string();
                (Bound::Datagram(socket), local)
            }
        };
        let property = ListenerProperty {
            network,
            addr: local,
            stop: CancellationToken::new(),
            finished: CancellationToken::new(),
        };
        self.inner.properties.record(property.clone());
        Ok((bound, property))
    }

    async fn serve(&self, bound: Bound, property: ListenerProperty) {
        let shared = Arc::clone(&self.inner.shared);
        match bound {
            Bound::Stream(listener) => stream::serve(shared, listener, property.stop.clone()).await,
            Bound::Datagram(socket) => datagram::serve(shared, socket, property.stop.clone()).await,
        }
        property.finished.cancel();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("running", &self.is_running())
            .field("listeners", &self.local_addrs())
            .field("config", &self.inner.shared.config)
            .finish_non_exhaustive()
    }
}
