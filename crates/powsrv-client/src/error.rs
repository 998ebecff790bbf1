use std::time::Duration;

/// Errors returned by powsrv clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error (connect, socket options).
    #[error("transport error: {0}")]
    Transport(#[from] powsrv_transport::TransportError),

    /// Frame-level error, including a corrupted reply to this request.
    #[error("frame error: {0}")]
    Frame(#[from] powsrv_frame::FrameError),

    /// No reply arrived in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server replied with something this client cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The request was rejected before it was sent.
    #[error("invalid request: {0}")]
    Request(#[from] powsrv_frame::PayloadError),

    /// The server answered with an `Error` frame.
    #[error("server error: {0}")]
    Remote(String),

    /// The connection is gone; no further replies will arrive.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// Every request id is in flight.
    #[error("all 255 request ids are in flight")]
    Busy,
}

pub type Result<T> = std::result::Result<T, ClientError>;
