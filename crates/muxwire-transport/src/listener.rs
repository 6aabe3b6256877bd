use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::network::{Network, TransportKind};

/// A connected, accepted byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Type-erased accepted stream, so accept loops are transport independent.
pub type BoxedStream = Box<dyn AsyncStream>;

/// A bound stream listener (TCP or Unix domain socket).
pub struct StreamListener {
    inner: ListenerInner,
    network: Network,
    local_addr: String,
}

enum ListenerInner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, crate::unix::SocketPathGuard),
}

impl StreamListener {
    /// Bind a stream listener for `network` on `addr`.
    ///
    /// `addr` follows the `host:port` convention; a bare `:port` binds every
    /// interface of the network's address family.
    pub async fn bind(network: Network, addr: &str) -> Result<Self> {
        match network {
            Network::Tcp | Network::Tcp4 | Network::Tcp6 => {
                let target = resolve(network, addr).await?;
                let listener = TcpListener::bind(target)
                    .await
                    .map_err(|source| bind_error(network, addr, source))?;
                let local = listener
                    .local_addr()
                    .map_err(|source| bind_error(network, addr, source))?;
                info!(%network, addr = %local, "listening");
                Ok(Self {
                    inner: ListenerInner::Tcp(listener),
                    network,
                    local_addr: local.to_string(),
                })
            }
            #[cfg(unix)]
            Network::Unix => {
                let (listener, guard) = crate::unix::bind(addr)?;
                info!(%network, path = addr, "listening");
                Ok(Self {
                    inner: ListenerInner::Unix(listener, guard),
                    network,
                    local_addr: addr.to_string(),
                })
            }
            #[cfg(not(unix))]
            Network::Unix => Err(TransportError::Unavailable(network.to_string())),
            Network::Kcp => Err(TransportError::Unavailable(network.to_string())),
            Network::Udp | Network::Udp4 | Network::Udp6 => Err(TransportError::WrongKind {
                network: network.to_string(),
                kind: TransportKind::Datagram.as_str(),
            }),
        }
    }

    /// Accept the next connection, returning the stream and a printable peer address.
    pub async fn accept(&self) -> Result<(BoxedStream, String)> {
        match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
                let _ = stream.set_nodelay(true);
                debug!(%peer, "accepted tcp connection");
                Ok((Box::new(stream), peer.to_string()))
            }
            #[cfg(unix)]
            ListenerInner::Unix(listener, _) => {
                let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
                let peer = peer
                    .as_pathname()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "unix:unnamed".to_string());
                debug!(%peer, "accepted unix connection");
                Ok((Box::new(stream), peer))
            }
        }
    }

    /// The network this listener was bound for.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Resolved local address (socket address for TCP, path for Unix).
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }
}

impl std::fmt::Debug for StreamListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamListener")
            .field("network", &self.network)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Resolve `addr` to a socket address of the family `network` allows.
pub(crate) async fn resolve(network: Network, addr: &str) -> Result<SocketAddr> {
    let family = network.family();
    let normalized = if addr.starts_with(':') {
        match network {
            Network::Tcp6 | Network::Udp6 => format!("[::]{addr}"),
            _ => format!("0.0.0.0{addr}"),
        }
    } else {
        addr.to_string()
    };

    let mut candidates = tokio::net::lookup_host(normalized.as_str())
        .await
        .map_err(|source| bind_error(network, addr, source))?;
    candidates.find(|a| family.accepts(a)).ok_or_else(|| {
        bind_error(
            network,
            addr,
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "no address of the requested family",
            ),
        )
    })
}

fn bind_error(network: Network, addr: &str, source: std::io::Error) -> TransportError {
    TransportError::Bind {
        network: network.to_string(),
        addr: addr.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn tcp_bind_accept_roundtrip() {
        let listener = StreamListener::bind(Network::Tcp, "127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().to_string();

        let client = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"hello").await.unwrap();
        });

        let (mut stream, peer) = listener.accept().await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        assert!(peer.starts_with("127.0.0.1:"));
        client.await.unwrap();
    }

    #[tokio::test]
    async fn bare_port_binds_all_interfaces() {
        let listener = StreamListener::bind(Network::Tcp4, ":0").await.unwrap();
        assert!(listener.local_addr().starts_with("0.0.0.0:"));
    }

    #[tokio::test]
    async fn kcp_is_unavailable() {
        let err = StreamListener::bind(Network::Kcp, "127.0.0.1:0")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[tokio::test]
    async fn datagram_network_is_rejected() {
        let err = StreamListener::bind(Network::Udp, "127.0.0.1:0")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::WrongKind { .. }));
    }
}
