//! Stream transports for powsrv.
//!
//! Provides a unified interface over the two socket kinds the server can
//! listen on:
//! - Unix domain sockets, addressed by filesystem path
//! - TCP sockets, addressed by `host:port`
//!
//! This is the lowest layer of powsrv. The framing protocol is identical over
//! both; everything else builds on [`IpcStream`] and [`IpcListener`].

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod tcp;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use listener::{connect, IpcListener};
pub use tcp::TcpSocket;
pub use traits::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
