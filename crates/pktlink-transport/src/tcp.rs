use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

/// TCP listening endpoint.
///
/// Provides bind/accept/connect and hands out [`LinkStream`]s with
/// `TCP_NODELAY` set, since frames are small and latency-sensitive.
pub struct TcpLink {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpLink {
    /// Bind and listen on `addr`. Port 0 picks an ephemeral port.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let addrs = resolve(addr)?;
        let listener = TcpListener::bind(&addrs[..]).map_err(|source| TransportError::Bind {
            addr: TransportError::addr_string(&addrs),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(TransportError::NoLocalAddr)?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<LinkStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok(LinkStream::from_tcp(stream))
    }

    /// Connect to a listening endpoint (blocking).
    pub fn connect(addr: impl ToSocketAddrs) -> Result<LinkStream> {
        let addrs = resolve(addr)?;
        let stream = TcpStream::connect(&addrs[..]).map_err(|source| TransportError::Connect {
            addr: TransportError::addr_string(&addrs),
            source,
        })?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "connected over tcp");
        Ok(LinkStream::from_tcp(stream))
    }

    /// Connect with a bound on how long the TCP handshake may take.
    pub fn connect_timeout(addr: impl ToSocketAddrs, timeout: Duration) -> Result<LinkStream> {
        let addrs = resolve(addr)?;
        let mut last_err = None;
        for candidate in &addrs {
            match TcpStream::connect_timeout(candidate, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!(peer = %candidate, "connected over tcp");
                    return Ok(LinkStream::from_tcp(stream));
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(TransportError::Connect {
            addr: TransportError::addr_string(&addrs),
            source: last_err.unwrap_or_else(|| std::io::Error::other("no address candidates")),
        })
    }

    /// The address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

fn resolve(addr: impl ToSocketAddrs) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
    if addrs.is_empty() {
        return Err(TransportError::Unresolved("<empty>".to_string()));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_bind_accept_connect() {
        let listener = TcpLink::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        assert_ne!(addr.port(), 0);

        let handle = std::thread::spawn(move || {
            let mut client = TcpLink::connect(addr).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port nothing listens on.
        let addr = TcpLink::bind("127.0.0.1:0").unwrap().local_addr();
        let result = TcpLink::connect(addr);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn test_connect_timeout_succeeds() {
        let listener = TcpLink::bind("127.0.0.1:0").unwrap();
        let link = TcpLink::connect_timeout(listener.local_addr(), Duration::from_secs(2)).unwrap();
        assert_eq!(link.kind(), "tcp");
        assert_eq!(listener.transport_name(), "tcp");
    }

    #[test]
    fn test_bind_in_use_fails() {
        let first = TcpLink::bind("127.0.0.1:0").unwrap();
        let result = TcpLink::bind(first.local_addr());
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }
}
