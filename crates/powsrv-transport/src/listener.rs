use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::tcp::TcpSocket;
use crate::traits::IpcStream;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A bound listener for any [`Endpoint`] kind.
pub enum IpcListener {
    #[cfg(unix)]
    Unix(UnixDomainSocket),
    Tcp(TcpSocket),
}

impl IpcListener {
    /// Bind a listener for `endpoint`.
    ///
    /// Unix endpoints unlink a stale socket file before binding.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(IpcListener::Unix(UnixDomainSocket::bind(path)?)),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(crate::error::TransportError::Unsupported(
                endpoint.to_string(),
            )),
            Endpoint::Tcp(addr) => Ok(IpcListener::Tcp(TcpSocket::bind(addr)?)),
        }
    }

    /// Accept the next connection.
    pub fn accept(&self) -> Result<IpcStream> {
        match self {
            #[cfg(unix)]
            IpcListener::Unix(socket) => socket.accept(),
            IpcListener::Tcp(socket) => socket.accept(),
        }
    }

    /// Switch between blocking and non-blocking accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match self {
            #[cfg(unix)]
            IpcListener::Unix(socket) => socket.set_nonblocking(nonblocking),
            IpcListener::Tcp(socket) => socket.set_nonblocking(nonblocking),
        }
    }

    /// The endpoint clients should dial. For TCP this carries the real port
    /// when the listener was bound to port 0.
    pub fn local_endpoint(&self) -> Endpoint {
        match self {
            #[cfg(unix)]
            IpcListener::Unix(socket) => Endpoint::Unix(socket.path().to_path_buf()),
            IpcListener::Tcp(socket) => Endpoint::Tcp(socket.local_addr().to_string()),
        }
    }
}

/// Connect to `endpoint` (blocking).
pub fn connect(endpoint: &Endpoint) -> Result<IpcStream> {
    match endpoint {
        #[cfg(unix)]
        Endpoint::Unix(path) => UnixDomainSocket::connect(path),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(crate::error::TransportError::Unsupported(
            endpoint.to_string(),
        )),
        Endpoint::Tcp(addr) => TcpSocket::connect(addr),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn tcp_port_zero_reports_real_port() {
        let listener = IpcListener::bind(&Endpoint::Tcp("127.0.0.1:0".to_string())).unwrap();
        let endpoint = listener.local_endpoint();
        match &endpoint {
            Endpoint::Tcp(addr) => assert!(!addr.ends_with(":0")),
            other => panic!("unexpected endpoint {other:?}"),
        }

        let handle = std::thread::spawn(move || {
            let mut stream = connect(&endpoint).unwrap();
            stream.write_all(b"x").unwrap();
        });
        let mut accepted = listener.accept().unwrap();
        let mut buf = [0u8; 1];
        accepted.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"x");
        handle.join().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn nonblocking_accept_without_client_would_block() {
        let dir = std::env::temp_dir().join(format!("powsrv-listener-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let listener = IpcListener::bind(&Endpoint::Unix(dir.join("nb.sock"))).unwrap();
        listener.set_nonblocking(true).unwrap();

        match listener.accept() {
            Err(crate::TransportError::Accept(err)) => {
                assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock)
            }
            other => panic!("expected WouldBlock, got {other:?}"),
        }

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
