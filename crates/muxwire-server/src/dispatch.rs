use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use muxwire_router::{Connection, Dispatch};
use tracing::{debug, error};

use crate::server::Shared;

/// Run one request's handler chain on the blocking pool.
///
/// A panicking handler is logged and closes its connection; the process
/// and the other connections keep running.
pub(crate) fn dispatch(shared: &Arc<Shared>, conn: &Arc<Connection>, block: Bytes) {
    let shared = Arc::clone(shared);
    let conn = Arc::clone(conn);
    tokio::spawn(async move {
        let task_conn = Arc::clone(&conn);
        let outcome =
            tokio::task::spawn_blocking(move || shared.router.dispatch(task_conn, block)).await;
        match outcome {
            Ok(Dispatch::Completed) => {}
            Ok(outcome) => debug!(conn_id = conn.id(), ?outcome, "request not completed"),
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                error!(
                    conn_id = conn.id(),
                    peer = conn.peer_addr(),
                    panic = panic_message(&*payload),
                    "handler panicked, closing connection"
                );
                conn.close();
            }
            Err(e) => debug!(conn_id = conn.id(), error = %e, "request task cancelled"),
        }
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
