use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::connection::Connection;
use crate::error::{Result, RouterError};

/// Live connections by username.
///
/// One entry per username; a newer `online` replaces the previous connection
/// without closing it. Lookups take the read lock, online/offline the write lock.
#[derive(Debug, Default)]
pub struct ClientPool {
    clients: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn` under `username`.
    pub fn online(&self, username: &str, conn: Arc<Connection>) {
        let mut clients = self.clients.write();
        if let Some(previous) = conn.username() {
            if previous != username
                && clients.get(&previous).is_some_and(|c| c.id() == conn.id())
            {
                clients.remove(&previous);
            }
        }
        conn.set_username(Some(username.to_string()));
        debug!(username, conn_id = conn.id(), "client online");
        if let Some(replaced) = clients.insert(username.to_string(), conn) {
            debug!(username, conn_id = replaced.id(), "replaced previous registration");
        }
    }

    /// Remove `username` and close its connection.
    pub fn offline(&self, username: &str) -> Option<Arc<Connection>> {
        let removed = self.clients.write().remove(username)?;
        removed.set_username(None);
        removed.close();
        debug!(username, conn_id = removed.id(), "client offline");
        Some(removed)
    }

    pub fn get(&self, username: &str) -> Option<Arc<Connection>> {
        self.clients.read().get(username).cloned()
    }

    /// Queue a packed block for `username`.
    pub fn send_to(&self, username: &str, block: Bytes) -> Result<()> {
        let conn = self
            .get(username)
            .ok_or_else(|| RouterError::UnknownUser(username.to_string()))?;
        conn.send(block)
    }

    /// Drop the entry for a connection that is going away, if it still owns it.
    pub fn remove_connection(&self, conn: &Connection) {
        let Some(username) = conn.username() else {
            return;
        };
        let mut clients = self.clients.write();
        if clients.get(&username).is_some_and(|c| c.id() == conn.id()) {
            clients.remove(&username);
        }
    }

    /// Close every pooled connection.
    pub fn close_all(&self) {
        let conns: Vec<Arc<Connection>> = self.clients.read().values().cloned().collect();
        for conn in conns {
            conn.close();
        }
    }

    pub fn usernames(&self) -> Vec<String> {
        self.clients.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::stream_conn;

    #[test]
    fn online_lookup_offline() {
        let pool = Arc::new(ClientPool::new());
        let (conn, _rx) = stream_conn(1, Some(&pool));

        pool.online("u", Arc::clone(&conn));
        let found = pool.get("u").unwrap();
        assert!(Arc::ptr_eq(&found, &conn));
        assert_eq!(conn.username().as_deref(), Some("u"));

        let removed = pool.offline("u").unwrap();
        assert!(Arc::ptr_eq(&removed, &conn));
        assert!(pool.get("u").is_none());
        assert!(conn.is_closed());
    }

    #[test]
    fn send_to_unknown_user_is_an_error() {
        let pool = ClientPool::new();
        let err = pool.send_to("ghost", Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(err, RouterError::UnknownUser(u) if u == "ghost"));
        assert!(pool.offline("ghost").is_none());
    }

    #[test]
    fn newest_registration_wins() {
        let pool = Arc::new(ClientPool::new());
        let (first, _rx1) = stream_conn(1, Some(&pool));
        let (second, mut rx2) = stream_conn(2, Some(&pool));

        pool.online("u", Arc::clone(&first));
        pool.online("u", Arc::clone(&second));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get("u").unwrap().id(), 2);
        assert!(!first.is_closed());

        pool.send_to("u", Bytes::from_static(b"hi")).unwrap();
        assert_eq!(rx2.try_recv().unwrap(), Bytes::from_static(b"hi"));

        // The replaced connection going away must not evict the new owner.
        pool.remove_connection(&first);
        assert!(pool.get("u").is_some());
        pool.remove_connection(&second);
        assert!(pool.is_empty());
    }

    #[test]
    fn rename_moves_entry() {
        let pool = Arc::new(ClientPool::new());
        let (conn, _rx) = stream_conn(1, Some(&pool));
        pool.online("a", Arc::clone(&conn));
        pool.online("b", Arc::clone(&conn));
        assert_eq!(pool.usernames(), vec!["b".to_string()]);
    }

    #[test]
    fn close_all_closes_every_connection() {
        let pool = Arc::new(ClientPool::new());
        let (a, _ra) = stream_conn(1, Some(&pool));
        let (b, _rb) = stream_conn(2, Some(&pool));
        pool.online("a", Arc::clone(&a));
        pool.online("b", Arc::clone(&b));
        pool.close_all();
        assert!(a.is_closed() && b.is_closed());
    }
}
