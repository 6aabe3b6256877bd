//! Per-connection supervisors: heartbeat, auth deadline and broadcast close.
//!
//! Each watchdog ends as soon as its connection closes.

use std::sync::Arc;

use muxwire_router::{AuthState, Connection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{AuthConfig, HeartbeatConfig};

/// Close `conn` after `max_misses` consecutive intervals without a heartbeat.
pub(crate) async fn heartbeat(conn: Arc<Connection>, config: HeartbeatConfig) {
    let mut misses = 0u32;
    loop {
        tokio::select! {
            _ = conn.closed_token().cancelled() => return,
            _ = conn.heartbeat_signal().notified() => {
                misses = 0;
            }
            _ = tokio::time::sleep(config.interval) => {
                misses += 1;
                debug!(conn_id = conn.id(), misses, "heartbeat missed");
                if misses >= config.max_misses {
                    info!(conn_id = conn.id(), peer = %conn.peer_addr(), "heartbeat timeout, closing connection");
                    conn.close();
                    return;
                }
            }
        }
    }
}

/// Close `conn` if it is denied or does not pass auth before the deadline.
pub(crate) async fn auth(conn: Arc<Connection>, config: AuthConfig) {
    let mut state = conn.subscribe_auth();
    let deadline = tokio::time::sleep(config.deadline);
    tokio::pin!(deadline);

    loop {
        let current = *state.borrow_and_update();
        match current {
            AuthState::Passed => {
                debug!(conn_id = conn.id(), "auth passed");
                return;
            }
            AuthState::Denied => {
                reject(&conn, &config, "auth denied");
                return;
            }
            AuthState::Pending => {}
        }

        tokio::select! {
            _ = conn.closed_token().cancelled() => return,
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = &mut deadline => {
                reject(&conn, &config, "auth deadline exceeded");
                return;
            }
        }
    }
}

/// Close `conn` when the server broadcasts close-all.
pub(crate) async fn broadcast_close(conn: Arc<Connection>, close_all: CancellationToken) {
    tokio::select! {
        _ = conn.closed_token().cancelled() => {}
        _ = close_all.cancelled() => {
            debug!(conn_id = conn.id(), "close-all broadcast received");
            conn.close();
        }
    }
}

fn reject(conn: &Connection, config: &AuthConfig, reason: &'static str) {
    if let Some(message) = &config.deny_message {
        if let Err(e) = conn.reply(config.message_id, message, &[]) {
            debug!(conn_id = conn.id(), error = %e, "could not queue deny message");
        }
    }
    info!(conn_id = conn.id(), peer = %conn.peer_addr(), reason, "closing unauthenticated connection");
    conn.close();
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;
    use std::time::Duration;

    use bytes::Bytes;
    use muxwire_frame::{codec, Marshaller};
    use muxwire_router::ReplySink;
    use muxwire_transport::Network;
    use tokio::sync::mpsc;

    use super::*;

    fn conn() -> (Arc<Connection>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Connection::new(
            1,
            Network::Tcp,
            "127.0.0.1:5000",
            Marshaller::Json,
            ReplySink::Stream(tx),
            Weak::new(),
        );
        (conn, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_closes_after_three_misses() {
        let (conn, _rx) = conn();
        let config = HeartbeatConfig {
            interval: Duration::from_secs(1),
            ..HeartbeatConfig::default()
        };
        let task = tokio::spawn(heartbeat(Arc::clone(&conn), config));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!conn.is_closed());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        task.await.unwrap();
        assert!(conn.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_resets_miss_count() {
        let (conn, _rx) = conn();
        let config = HeartbeatConfig {
            interval: Duration::from_secs(1),
            ..HeartbeatConfig::default()
        };
        let task = tokio::spawn(heartbeat(Arc::clone(&conn), config));

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            conn.recv_heartbeat();
        }
        assert!(!conn.is_closed());

        conn.close();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn auth_deadline_sends_deny_message_then_closes() {
        let (conn, mut rx) = conn();
        let config = AuthConfig {
            deadline: Duration::from_secs(2),
            deny_message: Some("auth required".into()),
            ..AuthConfig::default()
        };
        auth(Arc::clone(&conn), config).await;

        assert!(conn.is_closed());
        let block = rx.try_recv().unwrap();
        assert_eq!(codec::message_id_of(&block).unwrap(), 1393);
        assert_eq!(codec::body_bytes_of(&block).unwrap(), b"\"auth required\"");
    }

    #[tokio::test(start_paused = true)]
    async fn auth_pass_keeps_connection_open() {
        let (conn, _rx) = conn();
        let task = tokio::spawn(auth(Arc::clone(&conn), AuthConfig::default()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        conn.set_auth(AuthState::Passed);
        task.await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!conn.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn auth_deny_closes_immediately() {
        let (conn, _rx) = conn();
        let task = tokio::spawn(auth(Arc::clone(&conn), AuthConfig::default()));
        conn.set_auth(AuthState::Denied);
        task.await.unwrap();
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn broadcast_closes_connection() {
        let (conn, _rx) = conn();
        let close_all = CancellationToken::new();
        let task = tokio::spawn(broadcast_close(Arc::clone(&conn), close_all.clone()));
        close_all.cancel();
        task.await.unwrap();
        assert!(conn.is_closed());
    }
}
