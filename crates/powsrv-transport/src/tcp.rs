use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

/// TCP transport.
///
/// Same framing as the Unix socket transport; intended for relaying between
/// hosts on a trusted network.
pub struct TcpSocket {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpSocket {
    /// Bind and listen on `host:port`. Port 0 picks a free port.
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            endpoint: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening on tcp");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection.
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted tcp connection");
        Ok(IpcStream::from_tcp(stream))
    }

    /// Switch the listening socket between blocking and non-blocking accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener.set_nonblocking(nonblocking).map_err(Into::into)
    }

    /// Connect to a listening TCP socket (blocking).
    pub fn connect(addr: &str) -> Result<IpcStream> {
        let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
            endpoint: addr.to_string(),
            source: e,
        })?;
        stream.set_nodelay(true)?;
        debug!(addr, "connected over tcp");
        Ok(IpcStream::from_tcp(stream))
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn bind_accept_connect_roundtrip() {
        let listener = TcpSocket::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();

        let handle = std::thread::spawn(move || {
            let mut client = TcpSocket::connect(&addr).unwrap();
            client.write_all(b"ping").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        handle.join().unwrap();
    }

    #[test]
    fn bind_reports_bad_address() {
        let result = TcpSocket::bind("not-an-address");
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }
}
