/// Errors raised by a PoW device. They are reported to the client as
/// `Error` frames and never end a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The computation failed or was given unusable input.
    #[error("pow computation failed: {0}")]
    Compute(String),

    /// (Re)initialization failed.
    #[error("device init failed: {0}")]
    Init(String),

    /// A previous computation panicked while holding the device.
    #[error("device {index} is poisoned by an earlier panic")]
    Poisoned { index: usize },

    /// The device cannot be reached (e.g. relay upstream down).
    #[error("device unavailable: {0}")]
    Unavailable(String),
}

/// Errors that stop the server or prevent it from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level error (bind, accept).
    #[error("transport error: {0}")]
    Transport(#[from] powsrv_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] powsrv_frame::FrameError),

    /// The server was configured without any PoW device.
    #[error("no pow devices configured")]
    NoDevices,

    /// Invalid server or device configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A device could not be created.
    #[error("device setup failed: {0}")]
    Device(#[from] DeviceError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
