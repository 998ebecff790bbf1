//! Clients for a powsrv server.
//!
//! [`PowClient`] keeps one connection open and lets any number of threads
//! issue requests concurrently: a background reader routes each reply to the
//! caller waiting on its request id. [`oneshot`] dials, sends one request and
//! reads one reply, for scripts and health checks.

pub mod client;
pub mod error;
pub mod oneshot;
mod pending;

pub use client::{ClientConfig, PowClient, PowInfo};
pub use error::{ClientError, Result};
pub use oneshot::{oneshot, oneshot_with_timeout};
