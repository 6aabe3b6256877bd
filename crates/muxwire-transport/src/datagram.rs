use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::info;

use crate::error::{Result, TransportError};
use crate::listener::resolve;
use crate::network::{Network, TransportKind};

/// A bound UDP socket serving datagram requests.
#[derive(Debug)]
pub struct DatagramSocket {
    socket: UdpSocket,
    network: Network,
    local_addr: SocketAddr,
}

impl DatagramSocket {
    pub async fn bind(network: Network, addr: &str) -> Result<Self> {
        if network.kind() != TransportKind::Datagram {
            return Err(TransportError::WrongKind {
                network: network.to_string(),
                kind: TransportKind::Stream.as_str(),
            });
        }
        let target = resolve(network, addr).await?;
        let socket = UdpSocket::bind(target)
            .await
            .map_err(|source| TransportError::Bind {
                network: network.to_string(),
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = socket.local_addr()?;
        info!(%network, addr = %local_addr, "listening");
        Ok(Self {
            socket,
            network,
            local_addr,
        })
    }

    /// Receive one datagram. Bytes beyond `buf.len()` are discarded by the OS.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Ok(self.socket.recv_from(buf).await?)
    }

    pub async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(buf, target).await?)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
