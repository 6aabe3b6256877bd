use std::io::{Read, Write};
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crate::error::{Result, TransportError};
use crate::network::{Network, TransportKind};

/// A blocking client stream; implements Read + Write.
///
/// Used by command-line tools and tests that speak the wire protocol without
/// an async runtime.
pub struct ClientStream {
    inner: ClientStreamInner,
}

enum ClientStreamInner {
    Tcp(std::net::TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl ClientStream {
    /// Connect to a stream server listening on `network`/`addr`.
    pub fn connect(network: Network, addr: &str) -> Result<Self> {
        match network {
            Network::Tcp | Network::Tcp4 | Network::Tcp6 => {
                let family = network.family();
                let candidates = addr
                    .to_socket_addrs()
                    .map_err(|source| connect_error(network, addr, source))?;
                let mut last_err = None;
                for target in candidates.filter(|a| family.accepts(a)) {
                    match std::net::TcpStream::connect(target) {
                        Ok(stream) => {
                            let _ = stream.set_nodelay(true);
                            return Ok(Self {
                                inner: ClientStreamInner::Tcp(stream),
                            });
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                Err(connect_error(
                    network,
                    addr,
                    last_err.unwrap_or_else(|| {
                        std::io::Error::new(
                            std::io::ErrorKind::AddrNotAvailable,
                            "no address of the requested family",
                        )
                    }),
                ))
            }
            #[cfg(unix)]
            Network::Unix => {
                let stream = std::os::unix::net::UnixStream::connect(addr)
                    .map_err(|source| connect_error(network, addr, source))?;
                Ok(Self {
                    inner: ClientStreamInner::Unix(stream),
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

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            ClientStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            ClientStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            ClientStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            ClientStreamInner::Unix(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            ClientStreamInner::Tcp(stream) => ClientStreamInner::Tcp(stream.try_clone()?),
            #[cfg(unix)]
            ClientStreamInner::Unix(stream) => ClientStreamInner::Unix(stream.try_clone()?),
        };
        Ok(Self { inner })
    }

    /// Half-close the write side so the peer sees end-of-stream.
    pub fn shutdown_write(&self) -> Result<()> {
        match &self.inner {
            ClientStreamInner::Tcp(stream) => stream
                .shutdown(std::net::Shutdown::Write)
                .map_err(Into::into),
            #[cfg(unix)]
            ClientStreamInner::Unix(stream) => stream
                .shutdown(std::net::Shutdown::Write)
                .map_err(Into::into),
        }
    }
}

impl Read for ClientStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ClientStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            ClientStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ClientStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ClientStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            ClientStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            ClientStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            ClientStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl std::fmt::Debug for ClientStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            ClientStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            ClientStreamInner::Unix(_) => "unix",
        };
        f.debug_struct("ClientStream").field("type", &kind).finish()
    }
}

/// Open a blocking UDP socket connected to `addr`, so `send`/`recv` talk to one server.
pub fn connect_datagram(network: Network, addr: &str) -> Result<UdpSocket> {
    if network.kind() != TransportKind::Datagram {
        return Err(TransportError::WrongKind {
            network: network.to_string(),
            kind: TransportKind::Stream.as_str(),
        });
    }
    let family = network.family();
    let target = addr
        .to_socket_addrs()
        .map_err(|source| connect_error(network, addr, source))?
        .find(|a| family.accepts(a))
        .ok_or_else(|| {
            connect_error(
                network,
                addr,
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "no address of the requested family",
                ),
            )
        })?;
    let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local).map_err(|source| connect_error(network, addr, source))?;
    socket
        .connect(target)
        .map_err(|source| connect_error(network, addr, source))?;
    Ok(socket)
}

fn connect_error(network: Network, addr: &str, source: std::io::Error) -> TransportError {
    TransportError::Connect {
        network: network.to_string(),
        addr: addr.to_string(),
        source,
    }
}
