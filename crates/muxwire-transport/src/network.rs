use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// Whether a transport carries a byte stream or discrete datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Stream,
    Datagram,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Stream => "stream",
            TransportKind::Datagram => "datagram",
        }
    }
}

/// A transport name as accepted by `listen_and_serve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Tcp,
    Tcp4,
    Tcp6,
    Unix,
    Udp,
    Udp4,
    Udp6,
    /// Reliable UDP. Recognised so callers get a clear error, never served.
    Kcp,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
            Network::Unix => "unix",
            Network::Udp => "udp",
            Network::Udp4 => "udp4",
            Network::Udp6 => "udp6",
            Network::Kcp => "kcp",
        }
    }

    pub fn kind(self) -> TransportKind {
        match self {
            Network::Tcp | Network::Tcp4 | Network::Tcp6 | Network::Unix | Network::Kcp => {
                TransportKind::Stream
            }
            Network::Udp | Network::Udp4 | Network::Udp6 => TransportKind::Datagram,
        }
    }

    /// Address family restriction for IP transports.
    pub(crate) fn family(self) -> Family {
        match self {
            Network::Tcp4 | Network::Udp4 => Family::V4,
            Network::Tcp6 | Network::Udp6 => Family::V6,
            _ => Family::Any,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    Any,
    V4,
    V6,
}

impl Family {
    pub(crate) fn accepts(self, addr: &std::net::SocketAddr) -> bool {
        match self {
            Family::Any => true,
            Family::V4 => addr.is_ipv4(),
            Family::V6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            "unix" => Ok(Network::Unix),
            "udp" => Ok(Network::Udp),
            "udp4" => Ok(Network::Udp4),
            "udp6" => Ok(Network::Udp6),
            "kcp" => Ok(Network::Kcp),
            other => Err(TransportError::UnknownNetwork(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        for name in ["tcp", "tcp4", "tcp6", "unix", "udp", "udp4", "udp6", "kcp"] {
            let network: Network = name.parse().unwrap();
            assert_eq!(network.as_str(), name);
        }
    }

    #[test]
    fn rejects_unknown_name() {
        let err = "http".parse::<Network>().unwrap_err();
        assert!(matches!(err, TransportError::UnknownNetwork(name) if name == "http"));
    }

    #[test]
    fn classifies_kind() {
        assert_eq!(Network::Tcp.kind(), TransportKind::Stream);
        assert_eq!(Network::Unix.kind(), TransportKind::Stream);
        assert_eq!(Network::Udp6.kind(), TransportKind::Datagram);
    }
}
