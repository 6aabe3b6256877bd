use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use muxwire_frame::{Header, Marshaller, Packer};
use muxwire_transport::Network;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, RouterError};
use crate::pool::ClientPool;
use crate::store::Store;

/// Where replies for a connection are queued.
///
/// Handlers never write to the socket themselves; a writer task (stream) or
/// the socket's sender task (datagram) drains the queue. Both queues are
/// bounded, and queueing never waits for room.
#[derive(Debug, Clone)]
pub enum ReplySink {
    Stream(mpsc::Sender<Bytes>),
    Datagram {
        tx: mpsc::Sender<(Bytes, SocketAddr)>,
        peer: SocketAddr,
    },
}

impl ReplySink {
    fn try_send(&self, block: Bytes) -> std::result::Result<(), TrySendError<()>> {
        match self {
            ReplySink::Stream(tx) => tx.try_send(block).map_err(discard),
            ReplySink::Datagram { tx, peer } => tx.try_send((block, *peer)).map_err(discard),
        }
    }
}

fn discard<T>(err: TrySendError<T>) -> TrySendError<()> {
    match err {
        TrySendError::Full(_) => TrySendError::Full(()),
        TrySendError::Closed(_) => TrySendError::Closed(()),
    }
}

/// Progress of the auth handshake on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Pending,
    Passed,
    Denied,
}

/// State shared by every request on one physical connection.
pub struct Connection {
    id: u64,
    network: Network,
    peer: String,
    packer: Packer,
    values: Store,
    username: RwLock<Option<String>>,
    pool: Weak<ClientPool>,
    sink: ReplySink,
    closed: CancellationToken,
    heartbeat: Notify,
    auth: watch::Sender<AuthState>,
}

impl Connection {
    pub fn new(
        id: u64,
        network: Network,
        peer: impl Into<String>,
        marshaller: Marshaller,
        sink: ReplySink,
        pool: Weak<ClientPool>,
    ) -> Arc<Self> {
        let (auth, _) = watch::channel(AuthState::Pending);
        Arc::new(Self {
            id,
            network,
            peer: peer.into(),
            packer: Packer::new(marshaller),
            values: Store::new(),
            username: RwLock::new(None),
            pool,
            sink,
            closed: CancellationToken::new(),
            heartbeat: Notify::new(),
            auth,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer
    }

    pub fn packer(&self) -> &Packer {
        &self.packer
    }

    pub fn marshaller(&self) -> Marshaller {
        self.packer.marshaller()
    }

    /// Connection-scoped values; they live as long as the connection.
    pub fn values(&self) -> &Store {
        &self.values
    }

    pub fn username(&self) -> Option<String> {
        self.username.read().clone()
    }

    pub(crate) fn set_username(&self, username: Option<String>) {
        *self.username.write() = username;
    }

    pub fn pool(&self) -> Option<Arc<ClientPool>> {
        self.pool.upgrade()
    }

    /// Queue an already-packed block for this connection.
    ///
    /// A full queue means the peer stopped reading: the block is dropped and
    /// the connection closed.
    pub fn send(&self, block: Bytes) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(RouterError::Closed(self.id));
        }
        match self.sink.try_send(block) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(())) => Err(RouterError::Closed(self.id)),
            Err(TrySendError::Full(())) => {
                warn!(conn_id = self.id, peer = %self.peer, "reply queue full, closing connection");
                self.close();
                Err(RouterError::ReplyQueueFull(self.id))
            }
        }
    }

    /// Pack with this connection's marshaller and queue.
    pub fn reply<B: Serialize + ?Sized>(
        &self,
        message_id: i32,
        body: &B,
        headers: &[Header],
    ) -> Result<()> {
        let block = self.packer.pack(message_id, body, headers)?;
        self.send(block)
    }

    /// Signal every task serving this connection to stop. Idempotent.
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!(conn_id = self.id, peer = %self.peer, "closing connection");
            self.closed.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Cancelled when the connection closes.
    pub fn closed_token(&self) -> &CancellationToken {
        &self.closed
    }

    /// Record a heartbeat for the heartbeat watchdog.
    pub fn recv_heartbeat(&self) {
        self.heartbeat.notify_one();
    }

    pub fn heartbeat_signal(&self) -> &Notify {
        &self.heartbeat
    }

    pub fn set_auth(&self, state: AuthState) {
        self.auth.send_replace(state);
    }

    pub fn auth_state(&self) -> AuthState {
        *self.auth.borrow()
    }

    pub fn subscribe_auth(&self) -> watch::Receiver<AuthState> {
        self.auth.subscribe()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("network", &self.network)
            .field("peer", &self.peer)
            .field("marshaller", &self.packer.marshaller())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
