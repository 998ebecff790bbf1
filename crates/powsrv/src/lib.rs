//! Proof-of-work as a service over a small framed socket protocol.
//!
//! A long-running server owns the PoW devices; clients send transaction
//! trytes and get a nonce back, over a Unix domain socket or TCP.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain socket and TCP streams behind one endpoint type
//! - [`frame`]: sync/version/length/CRC-8 framing and command codes
//! - [`client`]: multiplexed and single-shot clients
//! - [`server`]: connection handler, device dispatcher and backends (behind
//!   the `server` feature)

/// Re-export transport types.
pub mod transport {
    pub use powsrv_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use powsrv_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use powsrv_client::*;
}

/// Re-export server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use powsrv_server::*;
}
