//! Receive loop for datagram transports.
//!
//! Every datagram is one self-contained request. Replies go back to the
//! sender's address through a single sender task that owns the write side.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use muxwire_frame::block_of_bytes;
use muxwire_router::{Connection, ReplySink};
use muxwire_transport::DatagramSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatch::dispatch;
use crate::server::Shared;

pub(crate) async fn serve(shared: Arc<Shared>, socket: DatagramSocket, stop: CancellationToken) {
    let socket = Arc::new(socket);
    let network = socket.network();
    let (tx, rx) = mpsc::channel(shared.config.reply_queue());
    let sender = tokio::spawn(send_loop(Arc::clone(&socket), rx));

    let mut buf = vec![0u8; shared.config.datagram_buffer_size];
    loop {
        let (n, peer) = tokio::select! {
            _ = stop.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    // ICMP port-unreachable surfaces here on some platforms.
                    debug!(%network, error = %e, "datagram receive failed");
                    continue;
                }
            },
        };

        let block = match block_of_bytes(&buf[..n]) {
            Ok(block) => Bytes::copy_from_slice(block),
            Err(e) => {
                warn!(%network, %peer, error = %e, "dropping malformed datagram");
                continue;
            }
        };

        let conn = Connection::new(
            shared.next_conn_id(),
            network,
            peer.to_string(),
            shared.config.marshaller,
            ReplySink::Datagram { tx: tx.clone(), peer },
            Weak::new(),
        );
        dispatch(&shared, &conn, block);
    }

    sender.abort();
    let _ = sender.await;
    debug!(%network, addr = %socket.local_addr(), "datagram loop stopped");
}

async fn send_loop(socket: Arc<DatagramSocket>, mut rx: mpsc::Receiver<(Bytes, SocketAddr)>) {
    while let Some((block, peer)) = rx.recv().await {
        if let Err(e) = socket.send_to(&block, peer).await {
            warn!(%peer, error = %e, "datagram send failed");
        }
    }
}
