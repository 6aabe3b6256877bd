use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use muxwire_frame::{codec, Header, Marshaller, Message, Packer};
use muxwire_transport::Network;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::connection::{AuthState, Connection};
use crate::error::{Result, RouterError};
use crate::router::HandlerFn;
use crate::store::Store;

/// Per-request dispatch state.
///
/// Built fresh for every request: the cursor, resolved chain, abort flag and
/// request-scoped values belong to this request only, while the
/// [`Connection`] is shared with every other request on the same connection.
pub struct Context {
    conn: Arc<Connection>,
    block: Bytes,
    chain: Vec<HandlerFn>,
    cursor: usize,
    aborted: bool,
    values: Store,
}

impl Context {
    pub fn new(conn: Arc<Connection>, block: Bytes, chain: Vec<HandlerFn>) -> Self {
        Self {
            conn,
            block,
            chain,
            cursor: 0,
            aborted: false,
            values: Store::new(),
        }
    }

    /// Run the remaining handlers in the chain.
    ///
    /// Called once by the dispatcher to start a request; a middleware may call
    /// it to run the rest of the chain before doing its own post-processing.
    /// Entries that already ran are never repeated, and nothing runs after
    /// [`Context::abort`].
    pub fn next(&mut self) {
        while self.cursor < self.chain.len() && !self.aborted {
            let handler = Arc::clone(&self.chain[self.cursor]);
            self.cursor += 1;
            handler(self);
        }
    }

    /// Stop the chain; nothing after the current handler runs.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Rewind the cursor and clear the abort flag so the next
    /// [`Context::next`] starts the chain from the beginning.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.aborted = false;
    }

    /// The raw request block.
    pub fn block(&self) -> &Bytes {
        &self.block
    }

    pub fn message_id(&self) -> Result<i32> {
        Ok(codec::message_id_of(&self.block)?)
    }

    pub fn header(&self) -> Result<Header> {
        Ok(codec::header_of(&self.block)?)
    }

    pub fn url_pattern(&self) -> Result<Option<String>> {
        Ok(codec::url_pattern_of(&self.block)?)
    }

    /// Decode the request with the connection's marshaller.
    pub fn bind<B: DeserializeOwned>(&self) -> Result<Message<B>> {
        self.bind_with(self.conn.marshaller())
    }

    /// Decode the request with an explicit marshaller.
    pub fn bind_with<B: DeserializeOwned>(&self, marshaller: Marshaller) -> Result<Message<B>> {
        Ok(codec::unpack(marshaller, &self.block)?)
    }

    pub fn reply<B: Serialize + ?Sized>(
        &self,
        message_id: i32,
        body: &B,
        headers: &[Header],
    ) -> Result<()> {
        self.conn.reply(message_id, body, headers)
    }

    /// Reply with pre-encoded body bytes.
    pub fn reply_raw(&self, message_id: i32, body: &[u8], headers: &[Header]) -> Result<()> {
        let block = self.conn.packer().pack_raw(message_id, body, headers)?;
        self.conn.send(block)
    }

    /// Reply with a JSON body whatever the connection's marshaller.
    pub fn reply_json<B: Serialize + ?Sized>(
        &self,
        message_id: i32,
        body: &B,
        headers: &[Header],
    ) -> Result<()> {
        let block = Packer::new(Marshaller::Json).pack(message_id, body, headers)?;
        self.conn.send(block)
    }

    /// Reply routed by URL pattern.
    pub fn reply_url<B: Serialize + ?Sized>(
        &self,
        pattern: &str,
        body: &B,
        headers: &[Header],
    ) -> Result<()> {
        let block = self.conn.packer().pack_url(pattern, body, headers)?;
        self.conn.send(block)
    }

    pub fn set_conn_value<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.conn.values().insert(key, value);
    }

    pub fn conn_value<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.conn.values().get(key)
    }

    pub fn set_request_value<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.values.insert(key, value);
    }

    pub fn request_value<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.values.get(key)
    }

    /// Register this connection in the client pool under `username`.
    pub fn online(&self, username: &str) -> Result<()> {
        let pool = self.conn.pool().ok_or(RouterError::PoolDisabled)?;
        pool.online(username, Arc::clone(&self.conn));
        Ok(())
    }

    /// Remove this connection from the client pool and close it.
    pub fn offline(&self) -> Result<()> {
        let pool = self.conn.pool().ok_or(RouterError::PoolDisabled)?;
        match self.conn.username() {
            Some(username) => {
                pool.offline(&username);
            }
            None => self.conn.close(),
        }
        Ok(())
    }

    pub fn username(&self) -> Option<String> {
        self.conn.username()
    }

    /// Pack with this connection's marshaller and queue for another user.
    pub fn send_to_username<B: Serialize + ?Sized>(
        &self,
        username: &str,
        message_id: i32,
        body: &B,
        headers: &[Header],
    ) -> Result<()> {
        let pool = self.conn.pool().ok_or(RouterError::PoolDisabled)?;
        let block = self.conn.packer().pack(message_id, body, headers)?;
        pool.send_to(username, block)
    }

    pub fn recv_heartbeat(&self) {
        self.conn.recv_heartbeat();
    }

    pub fn auth_pass(&self) {
        self.conn.set_auth(AuthState::Passed);
    }

    pub fn auth_deny(&self) {
        self.conn.set_auth(AuthState::Denied);
    }

    pub fn close(&self) {
        self.conn.close();
    }

    pub fn peer_addr(&self) -> &str {
        self.conn.peer_addr()
    }

    pub fn network(&self) -> Network {
        self.conn.network()
    }

    pub fn connection_id(&self) -> u64 {
        self.conn.id()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("conn_id", &self.conn.id())
            .field("cursor", &self.cursor)
            .field("chain_len", &self.chain.len())
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}
