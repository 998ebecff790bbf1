//! The powsrv server.
//!
//! [`PowServer`] accepts connections and runs one [`handler`] loop per
//! connection on its own thread. Every `PowFunc` goes through the
//! [`DeviceDispatcher`], which serializes work on each [`PowDevice`].

pub mod backend;
pub mod device;
pub mod error;
pub mod handler;
pub mod server;

pub use backend::{build_device, CpuDevice, DeviceSpec, RelayDevice};
pub use device::{DeviceDispatcher, PowDevice, SelectionPolicy};
pub use error::{DeviceError, Result, ServerError};
pub use handler::{
    handle_connection, handle_frame, Reply, ServerContext, ServerInfo,
    DEFAULT_MAX_MIN_WEIGHT_MAGNITUDE,
};
pub use server::PowServer;
