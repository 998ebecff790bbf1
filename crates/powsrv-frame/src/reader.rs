use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use powsrv_transport::IpcStream;

use crate::codec::{Frame, FrameConfig, FrameDecoder};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
// A 2673-tryte transaction plus framing fits in one read.
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// Decode errors (`ChecksumMismatch`, `VersionMismatch`, `InvalidLength`) are
/// returned without losing buffered bytes, so the next `read_frame` call
/// continues with the rest of the stream.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(),
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buf)? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read frames until one decodes cleanly, skipping recoverable decode
    /// errors through `on_skip`.
    pub fn read_frame_resync(&mut self, mut on_skip: impl FnMut(&FrameError)) -> Result<Frame> {
        loop {
            match self.read_frame() {
                Err(err) if err.is_recoverable() => on_skip(&err),
                other => return other,
            }
        }
    }
}

impl FrameReader<IpcStream> {
    /// Create a frame reader for `IpcStream` and apply read timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: &FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(inner))
    }
}

pub(crate) fn transport_to_frame_error(err: powsrv_transport::TransportError) -> FrameError {
    match err {
        powsrv_transport::TransportError::Io(io)
        | powsrv_transport::TransportError::Accept(io) => FrameError::Io(io),
        powsrv_transport::TransportError::Bind { source, .. }
        | powsrv_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
