use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use powsrv_transport::IpcStream;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// A frame is encoded into an internal buffer and written with a single
/// `write_all`-style loop, so frames from one writer never interleave.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode and send one frame.
    pub fn send(&mut self, request_id: u8, command: u8, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(request_id, command, payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

impl FrameWriter<IpcStream> {
    /// Create a frame writer for `IpcStream` and apply write timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: &FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameDecoder, MAX_PAYLOAD};
    use crate::command::Command;

    #[test]
    fn write_then_decode() {
        let mut writer = FrameWriter::new(Vec::new());
        writer
            .send(7, Command::PowFunc.code(), b"\x0eABC")
            .unwrap();
        writer
            .send(8, Command::InitPow.code(), b"")
            .unwrap();

        let mut buf = BytesMut::from(&writer.inner[..]);
        let mut decoder = FrameDecoder::new();
        let first = decoder.decode(&mut buf).unwrap().unwrap();
        let second = decoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(first.request_id, 7);
        assert_eq!(first.command(), Some(Command::PowFunc));
        assert_eq!(first.payload.as_ref(), b"\x0eABC");
        assert_eq!(second.request_id, 8);
        assert!(second.payload.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn oversize_payload_writes_nothing() {
        let mut writer = FrameWriter::new(Vec::new());
        let payload = vec![b'9'; MAX_PAYLOAD + 1];
        let err = writer.send(1, Command::PowFunc.code(), &payload).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(writer.inner.is_empty());
    }

    #[test]
    fn short_writes_are_completed() {
        let mut writer = FrameWriter::new(TrickleWriter::default());
        writer.send(3, Command::Response.code(), b"trickle").unwrap();
        assert_eq!(writer.inner.written.len(), 6 + 7 + 1);
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        let mut writer = FrameWriter::new(ClosedWriter);
        let err = writer.send(1, Command::GetPowType.code(), b"").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[derive(Default)]
    struct TrickleWriter {
        written: Vec<u8>,
        interrupted: bool,
    }

    impl Write for TrickleWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            let n = buf.len().min(2);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ClosedWriter;

    impl Write for ClosedWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
