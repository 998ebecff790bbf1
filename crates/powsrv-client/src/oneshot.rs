//! One request, one reply, one connection.

use std::time::Duration;

use bytes::Bytes;
use powsrv_frame::{command_name, Command, FrameConfig, FrameError, FrameReader, FrameWriter};
use powsrv_transport::Endpoint;
use tracing::debug;

use crate::error::{ClientError, Result};

const ONESHOT_REQUEST_ID: u8 = 1;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Send a single request with the default 5 s deadline.
pub fn oneshot(endpoint: &Endpoint, command: impl Into<u8>, payload: &[u8]) -> Result<Bytes> {
    oneshot_with_timeout(endpoint, command, payload, DEFAULT_TIMEOUT)
}

/// Dial `endpoint`, send one request and read exactly one frame back.
///
/// Stricter than [`PowClient`](crate::PowClient): a reply that fails its
/// checksum is an error rather than something to resync past, and a reply
/// for another request id is a protocol violation. Version and length noise
/// ahead of the reply is skipped.
pub fn oneshot_with_timeout(
    endpoint: &Endpoint,
    command: impl Into<u8>,
    payload: &[u8],
    timeout: Duration,
) -> Result<Bytes> {
    let command = command.into();
    let stream = powsrv_transport::connect(endpoint)?;
    let config = FrameConfig {
        read_timeout: Some(timeout),
        write_timeout: Some(timeout),
    };
    let mut reader = FrameReader::with_config_ipc(stream.try_clone()?, &config)?;
    let mut writer = FrameWriter::with_config_ipc(stream, &config)?;

    writer
        .send(ONESHOT_REQUEST_ID, command, payload)
        .map_err(|err| frame_error(err, timeout))?;
    debug!(%endpoint, command = command_name(command), "oneshot request sent");

    let frame = loop {
        match reader.read_frame() {
            Ok(frame) => break frame,
            Err(err @ (FrameError::VersionMismatch { .. } | FrameError::InvalidLength { .. })) => {
                debug!(%endpoint, error = %err, "skipping malformed frame");
            }
            Err(err) => return Err(frame_error(err, timeout)),
        }
    };

    if frame.request_id != ONESHOT_REQUEST_ID {
        return Err(ClientError::Protocol(format!(
            "reply carries request id {}, expected {ONESHOT_REQUEST_ID}",
            frame.request_id
        )));
    }

    match frame.command() {
        Some(Command::Response) => Ok(frame.payload),
        Some(Command::Error) => Err(ClientError::Remote(
            String::from_utf8_lossy(&frame.payload).into_owned(),
        )),
        _ => Err(ClientError::Protocol(format!(
            "unexpected command {} in reply",
            command_name(frame.command)
        ))),
    }
}

/// Socket timeouts surface as `WouldBlock` or `TimedOut` depending on the
/// platform; both become [`ClientError::Timeout`].
fn frame_error(err: FrameError, timeout: Duration) -> ClientError {
    match err {
        FrameError::Io(io)
            if matches!(
                io.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            ClientError::Timeout(timeout)
        }
        other => ClientError::Frame(other),
    }
}
