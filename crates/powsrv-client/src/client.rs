use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use powsrv_frame::{
    command_name, validate_trytes, Command, FrameConfig, FrameError, FrameReader, FrameWriter,
    PowRequest,
};
use powsrv_transport::{Endpoint, IpcStream, TransportError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::pending::PendingTable;

/// Timeouts applied by [`PowClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for version/type queries and `InitPow`.
    pub timeout: Duration,
    /// Deadline for `PowFunc`.
    pub pow_timeout: Duration,
    /// Socket write timeout.
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            pow_timeout: Duration::from_secs(60),
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Server identification, as returned by [`PowClient::get_pow_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowInfo {
    pub server_version: String,
    pub pow_type: String,
    pub pow_version: String,
}

type Pending = Arc<Mutex<PendingTable>>;

/// A multiplexed connection to a powsrv server.
///
/// `PowClient` is `Sync`: share it behind an `Arc` and call from as many
/// threads as needed. Each call gets its own request id and blocks only on
/// its own reply.
pub struct PowClient {
    endpoint: Endpoint,
    config: ClientConfig,
    pending: Pending,
    writer: Mutex<FrameWriter<IpcStream>>,
    control: IpcStream,
    reader: Option<JoinHandle<()>>,
}

impl PowClient {
    /// Connect with default timeouts.
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        Self::connect_with_config(endpoint, ClientConfig::default())
    }

    /// Connect and start the background reader.
    pub fn connect_with_config(endpoint: &Endpoint, config: ClientConfig) -> Result<Self> {
        let stream = powsrv_transport::connect(endpoint)?;
        let read_half = stream.try_clone()?;
        let control = stream.try_clone()?;

        let frame_config = FrameConfig {
            read_timeout: None,
            write_timeout: config.write_timeout,
        };
        let reader = FrameReader::with_config_ipc(read_half, &frame_config)?;
        let writer = FrameWriter::with_config_ipc(stream, &frame_config)?;

        let pending: Pending = Arc::new(Mutex::new(PendingTable::new()));
        let reader_pending = Arc::clone(&pending);
        let handle = std::thread::Builder::new()
            .name("powsrv-client-reader".to_string())
            .spawn(move || reader_loop(reader, reader_pending))
            .map_err(TransportError::from)?;

        info!(%endpoint, "connected to powsrv");

        Ok(Self {
            endpoint: endpoint.clone(),
            config,
            pending,
            writer: Mutex::new(writer),
            control,
            reader: Some(handle),
        })
    }

    /// Endpoint this client is connected to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Timeouts in effect.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// True once the reader has seen EOF or a transport error.
    pub fn is_closed(&self) -> bool {
        lock(&self.pending).is_closed()
    }

    /// Send one request and wait up to `timeout` for its reply.
    ///
    /// Returns the payload of a `Response` frame. An `Error` frame becomes
    /// [`ClientError::Remote`].
    pub fn call(&self, command: impl Into<u8>, payload: &[u8], timeout: Duration) -> Result<Bytes> {
        let command = command.into();
        let (request_id, rx) = lock(&self.pending).register()?;

        let sent = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(request_id, command, payload);
        if let Err(err) = sent {
            lock(&self.pending).remove(request_id);
            return Err(err.into());
        }
        debug!(request_id, command = command_name(command), "request sent");

        let frame = match rx.recv_timeout(timeout) {
            Ok(reply) => reply?,
            Err(RecvTimeoutError::Timeout) => {
                lock(&self.pending).remove(request_id);
                debug!(request_id, ?timeout, "request timed out");
                return Err(ClientError::Timeout(timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ClientError::Disconnected(
                    "reply handle dropped".to_string(),
                ));
            }
        };

        match frame.command() {
            Some(Command::Response) => Ok(frame.payload),
            Some(Command::Error) => Err(ClientError::Remote(
                String::from_utf8_lossy(&frame.payload).into_owned(),
            )),
            _ => Err(ClientError::Protocol(format!(
                "unexpected command {} ({:#04x}) in reply to request {request_id}",
                command_name(frame.command),
                frame.command
            ))),
        }
    }

    /// Server software version.
    pub fn get_server_version(&self) -> Result<String> {
        self.query_string(Command::GetServerVersion)
    }

    /// Device type of the server's first PoW device.
    pub fn get_pow_type(&self) -> Result<String> {
        self.query_string(Command::GetPowType)
    }

    /// Device version of the server's first PoW device.
    pub fn get_pow_version(&self) -> Result<String> {
        self.query_string(Command::GetPowVersion)
    }

    /// All three identification strings.
    pub fn get_pow_info(&self) -> Result<PowInfo> {
        Ok(PowInfo {
            server_version: self.get_server_version()?,
            pow_type: self.get_pow_type()?,
            pow_version: self.get_pow_version()?,
        })
    }

    /// Re-initialize the server's PoW devices.
    pub fn init_pow(&self) -> Result<()> {
        self.call(Command::InitPow, &[], self.config.timeout)?;
        Ok(())
    }

    /// Search a nonce for `trytes` at difficulty `min_weight_magnitude`.
    ///
    /// Out-of-range difficulty or non-tryte input fails locally with
    /// [`ClientError::Request`] without touching the connection.
    pub fn pow_func(&self, trytes: &str, min_weight_magnitude: u8) -> Result<String> {
        let request = PowRequest::new(trytes, min_weight_magnitude)?;
        let reply = self.call(
            Command::PowFunc,
            &request.to_payload(),
            self.config.pow_timeout,
        )?;
        trytes_reply(&reply)
    }

    fn query_string(&self, command: Command) -> Result<String> {
        let reply = self.call(command, &[], self.config.timeout)?;
        String::from_utf8(reply.to_vec())
            .map_err(|_| ClientError::Protocol(format!("{command} reply is not UTF-8")))
    }
}

impl Drop for PowClient {
    fn drop(&mut self) {
        lock(&self.pending).close("client dropped");
        if let Err(err) = self.control.shutdown() {
            debug!(error = %err, "socket shutdown failed");
        }
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("client reader thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for PowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowClient")
            .field("endpoint", &self.endpoint)
            .field("in_flight", &lock(&self.pending).len())
            .finish()
    }
}

pub(crate) fn trytes_reply(reply: &[u8]) -> Result<String> {
    validate_trytes(reply)
        .map_err(|err| ClientError::Protocol(format!("pow reply is not trytes: {err}")))?;
    Ok(String::from_utf8_lossy(reply).into_owned())
}

fn lock(pending: &Mutex<PendingTable>) -> MutexGuard<'_, PendingTable> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn reader_loop(mut reader: FrameReader<IpcStream>, pending: Pending) {
    let reason = loop {
        match reader.read_frame() {
            Ok(frame) => {
                let request_id = frame.request_id;
                if !lock(&pending).complete(request_id, Ok(frame)) {
                    debug!(request_id, "dropping reply with no pending request");
                }
            }
            Err(FrameError::ChecksumMismatch {
                request_id,
                computed,
                received,
            }) => {
                debug!(request_id, "reply failed checksum");
                let err = FrameError::ChecksumMismatch {
                    request_id,
                    computed,
                    received,
                };
                lock(&pending).complete(request_id, Err(ClientError::Frame(err)));
            }
            Err(err) if err.is_recoverable() => {
                debug!(error = %err, "skipping malformed frame");
            }
            Err(FrameError::ConnectionClosed) => break "connection closed".to_string(),
            Err(err) => break err.to_string(),
        }
    };

    let mut table = lock(&pending);
    if !table.is_closed() {
        info!(reason = %reason, in_flight = table.len(), "powsrv connection lost");
    }
    table.close(&reason);
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::time::Instant;

    use powsrv_frame::Frame;
    use powsrv_transport::IpcListener;

    use super::*;

    fn socket_path(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("powsrv-client-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("s.sock")
    }

    /// Serve one connection with `respond`, which maps a request to the raw
    /// bytes to write back (possibly nothing).
    fn serve_one(
        tag: &str,
        respond: impl Fn(&Frame) -> Vec<u8> + Send + 'static,
    ) -> (Endpoint, std::thread::JoinHandle<()>) {
        let endpoint = Endpoint::Unix(socket_path(tag));
        let listener = IpcListener::bind(&endpoint).unwrap();
        let handle = std::thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let mut writer_stream = stream.try_clone().unwrap();
            let mut reader = FrameReader::new(stream);
            while let Ok(frame) = reader.read_frame() {
                let bytes = respond(&frame);
                if std::io::Write::write_all(&mut writer_stream, &bytes).is_err() {
                    break;
                }
            }
        });
        (endpoint, handle)
    }

    fn encoded(request_id: u8, command: Command, payload: &[u8]) -> Vec<u8> {
        let mut buf = bytes::BytesMut::new();
        powsrv_frame::encode_frame(request_id, command.code(), payload, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn error_reply_becomes_remote() {
        let (endpoint, server) = serve_one("remote", |frame| {
            encoded(frame.request_id, Command::Error, b"device on fire")
        });
        let client = PowClient::connect(&endpoint).unwrap();
        let err = client.init_pow().unwrap_err();
        assert!(matches!(err, ClientError::Remote(ref msg) if msg == "device on fire"));
        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn corrupted_reply_fails_only_that_call() {
        let (endpoint, server) = serve_one("corrupt", |frame| {
            let mut bytes = encoded(frame.request_id, Command::Response, b"1.0.0");
            if frame.command == Command::GetPowType.code() {
                let last = bytes.len() - 1;
                bytes[last] ^= 0xFF;
            }
            bytes
        });
        let client = PowClient::connect(&endpoint).unwrap();

        let err = client.get_pow_type().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Frame(FrameError::ChecksumMismatch { .. })
        ));
        assert_eq!(client.get_server_version().unwrap(), "1.0.0");
        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn server_hangup_fails_pending_and_later_calls() {
        let endpoint = Endpoint::Unix(socket_path("hangup"));
        let listener = IpcListener::bind(&endpoint).unwrap();
        let server = std::thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let mut reader = FrameReader::new(stream);
            let _ = reader.read_frame();
        });

        let client = PowClient::connect(&endpoint).unwrap();
        let started = Instant::now();
        let err = client.get_server_version().unwrap_err();
        assert!(matches!(err, ClientError::Disconnected(_)), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
        server.join().unwrap();

        assert!(client.is_closed());
        assert!(matches!(
            client.get_pow_type(),
            Err(ClientError::Disconnected(_))
        ));
    }

    #[test]
    fn pow_func_validates_before_sending() {
        let (endpoint, server) = serve_one("validate", |frame| {
            encoded(frame.request_id, Command::Response, b"")
        });
        let client = PowClient::connect(&endpoint).unwrap();

        assert!(matches!(
            client.pow_func("ABC", 244),
            Err(ClientError::Request(_))
        ));
        assert!(matches!(
            client.pow_func("abc", 10),
            Err(ClientError::Request(_))
        ));
        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn non_tryte_pow_reply_is_protocol_error() {
        let (endpoint, server) = serve_one("badreply", |frame| {
            encoded(frame.request_id, Command::Response, b"not trytes!")
        });
        let client = PowClient::connect(&endpoint).unwrap();
        assert!(matches!(
            client.pow_func("ABC", 1),
            Err(ClientError::Protocol(_))
        ));
        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn unexpected_reply_command_is_protocol_error() {
        let (endpoint, server) = serve_one("notify", |frame| {
            encoded(frame.request_id, Command::Notification, b"")
        });
        let client = PowClient::connect(&endpoint).unwrap();
        let err = client.get_server_version().unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ref msg) if msg.contains("Notification")));
        drop(client);
        server.join().unwrap();
    }
}
