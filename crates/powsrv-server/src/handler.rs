//! Per-connection request loop and command dispatch.

use powsrv_frame::{
    command_name, Command, Frame, FrameError, FrameReader, FrameWriter, PayloadError, PowRequest,
};
use powsrv_transport::IpcStream;
use tracing::{debug, info, warn};

use crate::device::DeviceDispatcher;
use crate::error::Result;

/// Difficulty cap used when none is configured. Mainnet transactions use 14.
pub const DEFAULT_MAX_MIN_WEIGHT_MAGNITUDE: u8 = 20;

/// Static facts the server reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Reply to `GetServerVersion`.
    pub version: String,
    /// Highest difficulty accepted for `PowFunc` (at most 243).
    pub max_min_weight_magnitude: u8,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_min_weight_magnitude: DEFAULT_MAX_MIN_WEIGHT_MAGNITUDE,
        }
    }
}

/// Everything connections share.
#[derive(Debug)]
pub struct ServerContext {
    pub info: ServerInfo,
    pub devices: DeviceDispatcher,
}

impl ServerContext {
    pub fn new(info: ServerInfo, devices: DeviceDispatcher) -> Self {
        Self { info, devices }
    }
}

/// Reply to one request; the request id is echoed by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub command: Command,
    pub payload: Vec<u8>,
}

impl Reply {
    fn response(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command: Command::Response,
            payload: payload.into(),
        }
    }

    fn error(message: impl std::fmt::Display) -> Self {
        Self {
            command: Command::Error,
            payload: message.to_string().into_bytes(),
        }
    }

    /// True for `Error` replies.
    pub fn is_error(&self) -> bool {
        self.command == Command::Error
    }
}

/// Decide the reply for one decoded request.
///
/// Version and type queries never touch a device lock. `PowFunc` input is
/// fully validated before a device is selected.
pub fn handle_frame(frame: &Frame, ctx: &ServerContext) -> Reply {
    match frame.command() {
        Some(Command::GetServerVersion) => Reply::response(ctx.info.version.as_bytes()),
        Some(Command::GetPowType) => Reply::response(ctx.devices.pow_type().as_bytes()),
        Some(Command::GetPowVersion) => Reply::response(ctx.devices.pow_version().as_bytes()),
        Some(Command::PowFunc) => pow_func(&frame.payload, ctx),
        Some(Command::InitPow) => match ctx.devices.init_all() {
            Ok(()) => Reply::response(Vec::new()),
            Err(err) => Reply::error(err),
        },
        Some(other) => Reply::error(format!("unexpected command {other}")),
        None => Reply::error(format!("unknown command {:#04x}", frame.command)),
    }
}

fn pow_func(payload: &[u8], ctx: &ServerContext) -> Reply {
    let request = match PowRequest::from_payload(payload) {
        Ok(request) => request,
        Err(err) => return Reply::error(format!("invalid pow request: {err}")),
    };

    let max = ctx.info.max_min_weight_magnitude;
    if request.min_weight_magnitude > max {
        let err = PayloadError::DifficultyOutOfRange {
            value: u32::from(request.min_weight_magnitude),
            max,
        };
        return Reply::error(format!("invalid pow request: {err}"));
    }

    match ctx
        .devices
        .compute(&request.trytes, request.min_weight_magnitude)
    {
        Ok(nonce) => Reply::response(nonce.into_bytes()),
        Err(err) => Reply::error(err),
    }
}

/// Serve one connection until the peer hangs up.
///
/// Frames are handled strictly one after another. Malformed frames are
/// skipped; read and write failures end the connection.
pub fn handle_connection(stream: IpcStream, ctx: &ServerContext) -> Result<()> {
    let peer = stream.peer_label();
    let mut reader = FrameReader::new(stream.try_clone()?);
    let mut writer = FrameWriter::new(stream);
    info!(%peer, "connection opened");

    let mut served = 0u64;
    let outcome = loop {
        let read = reader.read_frame_resync(|err| {
            debug!(%peer, error = %err, "skipping malformed frame");
        });
        let frame = match read {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => break Ok(()),
            Err(err) => break Err(err.into()),
        };

        debug!(
            %peer,
            request_id = frame.request_id,
            command = command_name(frame.command),
            bytes = frame.wire_size(),
            "request"
        );

        let reply = handle_frame(&frame, ctx);
        if reply.is_error() {
            debug!(
                %peer,
                request_id = frame.request_id,
                error = %String::from_utf8_lossy(&reply.payload),
                "request failed"
            );
        }

        if let Err(err) = writer.send(frame.request_id, reply.command.code(), &reply.payload) {
            warn!(%peer, error = %err, "failed to write reply");
            break Err(err.into());
        }
        served += 1;
    };

    info!(%peer, served, "connection closed");
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::device::{PowDevice, SelectionPolicy};
    use crate::error::DeviceError;

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail_init: bool,
    }

    impl PowDevice for Counting {
        fn compute(&mut self, _trytes: &str, mwm: u8) -> std::result::Result<String, DeviceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if mwm == 42 {
                return Err(DeviceError::Compute("no luck".to_string()));
            }
            Ok("NONCE".to_string())
        }

        fn init(&mut self) -> std::result::Result<(), DeviceError> {
            if self.fail_init {
                return Err(DeviceError::Init("fpga missing".to_string()));
            }
            Ok(())
        }

        fn pow_type(&self) -> String {
            "counting".to_string()
        }

        fn pow_version(&self) -> String {
            "7".to_string()
        }
    }

    fn context(max: u8, fail_init: bool) -> (ServerContext, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let device = Counting {
            calls: Arc::clone(&calls),
            fail_init,
        };
        let devices =
            DeviceDispatcher::new(vec![Box::new(device)], SelectionPolicy::RoundRobin).unwrap();
        let info = ServerInfo {
            max_min_weight_magnitude: max,
            ..ServerInfo::default()
        };
        (ServerContext::new(info, devices), calls)
    }

    fn request(command: impl Into<u8>, payload: &[u8]) -> Frame {
        Frame::new(9, command, payload.to_vec())
    }

    #[test]
    fn queries_return_strings() {
        let (ctx, calls) = context(243, false);
        let version = handle_frame(&request(Command::GetServerVersion, b""), &ctx);
        assert_eq!(version, Reply::response(env!("CARGO_PKG_VERSION")));
        assert_eq!(
            handle_frame(&request(Command::GetPowType, b""), &ctx).payload,
            b"counting"
        );
        assert_eq!(
            handle_frame(&request(Command::GetPowVersion, b""), &ctx).payload,
            b"7"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pow_input_rejected_before_device() {
        let (ctx, calls) = context(20, false);
        for payload in [&b""[..], b"\xf4ABC", b"\x15ABC", b"\x05abc"] {
            let reply = handle_frame(&request(Command::PowFunc, payload), &ctx);
            assert!(reply.is_error(), "{payload:?}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let reply = handle_frame(&request(Command::PowFunc, b"\x14ABC"), &ctx);
        assert_eq!(reply, Reply::response("NONCE"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn device_failure_becomes_error_reply() {
        let (ctx, _) = context(243, true);
        let reply = handle_frame(&request(Command::PowFunc, b"\x2aABC"), &ctx);
        assert_eq!(reply, Reply::error("pow computation failed: no luck"));

        let reply = handle_frame(&request(Command::InitPow, b""), &ctx);
        assert_eq!(reply, Reply::error("device init failed: fpga missing"));
    }

    #[test]
    fn reply_kinds_and_unknown_codes_are_errors() {
        let (ctx, _) = context(243, false);
        assert_eq!(
            handle_frame(&request(Command::Response, b""), &ctx),
            Reply::error("unexpected command Response")
        );
        assert_eq!(
            handle_frame(&request(Command::Notification, b""), &ctx),
            Reply::error("unexpected command Notification")
        );
        assert_eq!(
            handle_frame(&request(0x42u8, b""), &ctx),
            Reply::error("unknown command 0x42")
        );
    }
}
