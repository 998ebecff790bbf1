use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::error::Result;

/// A connected stream: implements Read + Write.
///
/// This is the fundamental I/O type returned by transport operations.
/// It wraps either a Unix domain socket stream or a TCP stream.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.read(buf),
            IpcStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.write(buf),
            IpcStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.flush(),
            IpcStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl IpcStream {
    /// Create an IpcStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }

    /// Create an IpcStream from a TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: IpcStreamInner::Tcp(stream),
        }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            IpcStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            IpcStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Switch the stream between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.set_nonblocking(nonblocking).map_err(Into::into),
            IpcStreamInner::Tcp(stream) => stream.set_nonblocking(nonblocking).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            IpcStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
        }
    }

    /// Shut down both halves of the connection.
    ///
    /// A thread blocked in `read` on a clone of this stream wakes up with EOF.
    pub fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
            IpcStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            other => other.map_err(Into::into),
        }
    }

    /// Human-readable peer description for logging.
    pub fn peer_label(&self) -> String {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => match self.peer_credentials() {
                Some((uid, _gid, pid)) => format!("unix(uid={uid},pid={pid})"),
                None => "unix".to_string(),
            },
            IpcStreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| format!("tcp({addr})"))
                .unwrap_or_else(|_| "tcp".to_string()),
        }
    }

    /// Get the credentials of the connected peer (Linux Unix sockets only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            IpcStreamInner::Unix(stream) => stream.as_raw_fd(),
            IpcStreamInner::Tcp(_) => return None,
        };

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and `fd` is an open Unix socket descriptor owned by this process.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => "unix",
            IpcStreamInner::Tcp(_) => "tcp",
        };
        f.debug_struct("IpcStream").field("type", &kind).finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn shutdown_wakes_blocked_reader_with_eof() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let stream = IpcStream::from_unix(left);
        let mut reader = stream.try_clone().unwrap();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 8];
            reader.read(&mut buf).unwrap()
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        stream.shutdown().unwrap();
        assert_eq!(handle.join().unwrap(), 0);
    }

    #[test]
    fn tcp_stream_reports_peer_address() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = IpcStream::from_tcp(TcpStream::connect(addr).unwrap());
        let _server = listener.accept().unwrap();

        assert!(client.peer_label().starts_with("tcp(127.0.0.1:"));
        assert!(client.peer_credentials().is_none());
        assert_eq!(format!("{client:?}"), "IpcStream { type: \"tcp\" }");
    }
}
