use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::checksum::checksum;
use crate::command::Command;
use crate::error::{FrameError, Result};

/// Sync byte (ASCII ENQ) that starts every frame.
pub const SYNC: u8 = 0x05;

/// The only protocol version this implementation speaks.
pub const VERSION: u8 = 0x01;

/// Header: sync (1) + version (1) + length (2) + request id (1) + command (1).
pub const HEADER_SIZE: usize = 6;

/// Trailer: checksum (1).
pub const TRAILER_SIZE: usize = 1;

/// Largest payload whose length (plus request id and command) fits in 16 bits.
pub const MAX_PAYLOAD: usize = u16::MAX as usize - 2;

/// A decoded, checksum-valid frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Correlates a reply with the request it answers.
    pub request_id: u8,
    /// Raw command byte; see [`Frame::command`].
    pub command: u8,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(request_id: u8, command: impl Into<u8>, payload: impl Into<Bytes>) -> Self {
        Self {
            request_id,
            command: command.into(),
            payload: payload.into(),
        }
    }

    /// The command, if the code is known.
    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.command)
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + TRAILER_SIZE
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬─────────┬────────────┬────────┬─────────┬───────────┬──────────┐
/// │ 0x05 │ 0x01    │ Length     │ ReqId  │ Command │ Payload   │ CRC-8    │
/// │ sync │ version │ (2B BE)    │ (1B)   │ (1B)    │ (Len - 2) │ (1B)     │
/// └──────┴─────────┴────────────┴────────┴─────────┴───────────┴──────────┘
/// ```
///
/// Length counts request id, command and payload. The checksum covers the
/// same bytes.
pub fn encode_frame(
    request_id: u8,
    command: u8,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len() + TRAILER_SIZE);
    dst.put_u8(SYNC);
    dst.put_u8(VERSION);
    dst.put_u16((payload.len() + 2) as u16);
    let body_start = dst.len();
    dst.put_u8(request_id);
    dst.put_u8(command);
    dst.put_slice(payload);
    let crc = checksum(&dst[body_start..]);
    dst.put_u8(crc);
    Ok(())
}

/// Position of the decoder within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Skipping bytes until a sync byte.
    SearchSync,
    /// Sync seen, expecting the version byte.
    SearchVersion,
    /// Expecting the high length byte.
    LengthHi,
    /// Expecting the low length byte.
    LengthLo,
    /// Collecting `length` bytes of request id, command and payload.
    AccumulateData,
    /// Expecting the checksum byte.
    VerifyChecksum,
}

/// Resumable frame decoder.
///
/// Holds nothing but the frame currently being assembled, so it can be fed an
/// unbounded stream split at arbitrary byte boundaries.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    length: usize,
    data: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::SearchSync,
            length: 0,
            data: BytesMut::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Drop any partial frame and go back to searching for a sync byte.
    pub fn reset(&mut self) {
        self.state = DecodeState::SearchSync;
        self.length = 0;
        self.data.clear();
    }

    /// Consume bytes from `src` until a frame completes or `src` runs dry.
    ///
    /// Returns `Ok(None)` when more data is needed. On `VersionMismatch`,
    /// `ChecksumMismatch` or `InvalidLength` the decoder has already reset to
    /// [`DecodeState::SearchSync`]; call again to continue with the rest of
    /// the stream.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            match self.state {
                DecodeState::SearchSync => match src.iter().position(|&b| b == SYNC) {
                    Some(pos) => {
                        if pos > 0 {
                            trace!(skipped = pos, "skipping bytes before sync");
                        }
                        src.advance(pos + 1);
                        self.state = DecodeState::SearchVersion;
                    }
                    None => {
                        if !src.is_empty() {
                            trace!(skipped = src.len(), "no sync byte in buffer");
                        }
                        src.clear();
                        return Ok(None);
                    }
                },
                DecodeState::SearchVersion => {
                    let Some(&byte) = src.first() else {
                        return Ok(None);
                    };
                    if byte != VERSION {
                        // Leave the byte in place; it may be the next sync.
                        self.reset();
                        return Err(FrameError::VersionMismatch { found: byte });
                    }
                    src.advance(1);
                    self.state = DecodeState::LengthHi;
                }
                DecodeState::LengthHi => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    self.length = (src.get_u8() as usize) << 8;
                    self.state = DecodeState::LengthLo;
                }
                DecodeState::LengthLo => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    self.length |= src.get_u8() as usize;
                    if self.length < 2 {
                        let length = self.length;
                        self.reset();
                        return Err(FrameError::InvalidLength { length });
                    }
                    self.data.clear();
                    self.data.reserve(self.length);
                    self.state = DecodeState::AccumulateData;
                }
                DecodeState::AccumulateData => {
                    let missing = self.length - self.data.len();
                    let take = missing.min(src.len());
                    self.data.extend_from_slice(&src[..take]);
                    src.advance(take);
                    if self.data.len() < self.length {
                        return Ok(None);
                    }
                    self.state = DecodeState::VerifyChecksum;
                }
                DecodeState::VerifyChecksum => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let received = src.get_u8();
                    let computed = checksum(&self.data);
                    let mut body = self.data.split().freeze();
                    self.reset();

                    let request_id = body[0];
                    if computed != received {
                        return Err(FrameError::ChecksumMismatch {
                            request_id,
                            computed,
                            received,
                        });
                    }

                    let command = body[1];
                    body.advance(2);
                    return Ok(Some(Frame {
                        request_id,
                        command,
                        payload: body,
                    }));
                }
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for blocking frame I/O.
#[derive(Debug, Clone, Default)]
pub struct FrameConfig {
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}
