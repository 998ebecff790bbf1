use std::fmt;
use std::io;

use powsrv_client::ClientError;
use powsrv_frame::FrameError;
use powsrv_server::ServerError;
use powsrv_transport::TransportError;

use crate::config::ConfigError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        io::ErrorKind::AddrInUse | io::ErrorKind::AlreadyExists => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidEndpoint { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::ChecksumMismatch { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    match err {
        ClientError::Transport(err) => transport_error(context, err),
        ClientError::Frame(err) => frame_error(context, err),
        ClientError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ClientError::Protocol(_) | ClientError::Request(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ClientError::Remote(_) | ClientError::Disconnected(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ClientError::Busy => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn server_error(context: &str, err: ServerError) -> CliError {
    match err {
        ServerError::Transport(err) => transport_error(context, err),
        ServerError::Frame(err) => frame_error(context, err),
        ServerError::NoDevices | ServerError::Config(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        ServerError::Device(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    match err {
        ConfigError::Read { source, .. } => io_error(context, source),
        ConfigError::Parse { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ConfigError::Invalid(_) => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn client_errors_map_to_exit_codes() {
        let code = |err| client_error("ctx", err).code;
        assert_eq!(code(ClientError::Timeout(Duration::from_secs(1))), TIMEOUT);
        assert_eq!(code(ClientError::Remote("boom".into())), FAILURE);
        assert_eq!(code(ClientError::Protocol("bad".into())), DATA_INVALID);
        assert_eq!(code(ClientError::Busy), INTERNAL);
        assert_eq!(
            code(ClientError::Transport(TransportError::Connect {
                endpoint: "/tmp/x.sock".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            })),
            TRANSPORT_ERROR
        );
    }

    #[test]
    fn message_keeps_context() {
        let err = client_error("pow failed", ClientError::Remote("no device".into()));
        assert_eq!(err.to_string(), "pow failed: server error: no device");
    }
}
