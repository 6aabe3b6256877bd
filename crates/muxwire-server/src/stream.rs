//! Accept loop and per-connection tasks for stream transports.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use muxwire_frame::{block_of_bytes, header, header_of, BlockCodec, FrameError};
use muxwire_router::{Connection, ReplySink};
use muxwire_transport::{BoxedStream, Network, StreamListener};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::dispatch;
use crate::server::Shared;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// How long a closing connection may spend flushing queued replies.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) async fn serve(shared: Arc<Shared>, listener: StreamListener, stop: CancellationToken) {
    let network = listener.network();
    debug!(%network, addr = listener.local_addr(), "accept loop started");

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(Arc::clone(&shared), network, stream, peer));
                }
                Err(e) => {
                    warn!(%network, error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    info!(%network, addr = listener.local_addr(), "listener stopped");
    drop(listener);
}

async fn handle_connection(shared: Arc<Shared>, network: Network, stream: BoxedStream, peer: String) {
    let (read_half, write_half) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel(shared.config.reply_queue());
    let conn = Connection::new(
        shared.next_conn_id(),
        network,
        peer,
        shared.config.marshaller,
        ReplySink::Stream(tx),
        shared.pool_ref(),
    );
    debug!(conn_id = conn.id(), peer = conn.peer_addr(), "connection opened");

    let max = shared.config.max_frame_size;
    let writer = tokio::spawn(write_loop(
        FramedWrite::new(write_half, BlockCodec::new(max)),
        rx,
        Arc::clone(&conn),
    ));

    shared.run_on_connect(&conn).await;
    shared.spawn_watchdogs(&conn);

    let mut blocks = FramedRead::new(read_half, BlockCodec::new(max));
    if let Err(e) = read_loop(&shared, &conn, &mut blocks).await {
        warn!(conn_id = conn.id(), peer = conn.peer_addr(), error = %e, "closing connection on bad frame");
    }

    conn.close();
    let _ = writer.await;
    if let Some(pool) = &shared.pool {
        pool.remove_connection(&conn);
    }
    shared.run_on_close(&conn).await;
    debug!(conn_id = conn.id(), "connection closed");
}

/// Read blocks until EOF, close or a framing error. Each request is
/// dispatched on its own task; the loop never waits for a handler.
async fn read_loop<R>(
    shared: &Arc<Shared>,
    conn: &Arc<Connection>,
    blocks: &mut FramedRead<R, BlockCodec>,
) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let block = tokio::select! {
            _ = conn.closed_token().cancelled() => return Ok(()),
            next = blocks.next() => match next {
                Some(block) => block?,
                None => return Ok(()),
            },
        };
        block_of_bytes(&block)?;

        let follow = header_of(&block).ok().and_then(|h| header::pipe_of(&h));
        let Some(follow) = follow else {
            dispatch(shared, conn, block);
            continue;
        };

        let max = shared.config.max_pipeline;
        if follow > max {
            return Err(FrameError::PipelineTooLong { count: follow, max });
        }

        let mut batch = vec![block];
        for _ in 0..follow {
            let next = tokio::select! {
                _ = conn.closed_token().cancelled() => return Ok(()),
                next = blocks.next() => next,
            };
            match next {
                Some(block) => {
                    let block = block?;
                    block_of_bytes(&block)?;
                    batch.push(block);
                }
                None => {
                    warn!(conn_id = conn.id(), expected = follow, received = batch.len() - 1, "connection ended inside a pipeline");
                    return Ok(());
                }
            }
        }
        debug!(conn_id = conn.id(), blocks = batch.len(), "pipeline received");
        for block in batch {
            dispatch(shared, conn, block);
        }
    }
}

/// Resolves once `conn` has been closed for [`DRAIN_TIMEOUT`].
async fn grace_after_close(conn: &Connection) {
    conn.closed_token().cancelled().await;
    tokio::time::sleep(DRAIN_TIMEOUT).await;
}

async fn write_loop<W>(
    mut sink: FramedWrite<W, BlockCodec>,
    mut rx: mpsc::Receiver<Bytes>,
    conn: Arc<Connection>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            block = rx.recv() => match block {
                Some(block) => {
                    let sent = tokio::select! {
                        biased;
                        sent = sink.send(block) => sent,
                        _ = grace_after_close(&conn) => break,
                    };
                    if let Err(e) = sent {
                        warn!(conn_id = conn.id(), error = %e, "write failed");
                        conn.close();
                        break;
                    }
                }
                None => break,
            },
            _ = conn.closed_token().cancelled() => {
                let drain = async {
                    while let Ok(block) = rx.try_recv() {
                        sink.feed(block).await?;
                    }
                    sink.flush().await
                };
                match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(conn_id = conn.id(), error = %e, "drain after close failed"),
                    Err(_) => debug!(conn_id = conn.id(), "peer not reading, dropping queued replies"),
                }
                break;
            }
        }
    }
    match tokio::time::timeout(DRAIN_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(conn_id = conn.id(), error = %e, "shutdown after close failed"),
        Err(_) => debug!(conn_id = conn.id(), "shutdown after close timed out"),
    }
}
