/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame checksum does not match its contents.
    #[error("checksum mismatch for request {request_id} (computed {computed:#04x}, received {received:#04x})")]
    ChecksumMismatch {
        request_id: u8,
        computed: u8,
        received: u8,
    },

    /// A sync byte was followed by an unsupported protocol version.
    #[error("unsupported protocol version {found:#04x}")]
    VersionMismatch { found: u8 },

    /// The length field is too small to hold request id and command.
    #[error("invalid frame length {length}")]
    InvalidLength { length: usize },

    /// The payload does not fit the 16-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True for errors after which the stream is still usable: the decoder
    /// has already dropped the bad bytes and resynchronized.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::ChecksumMismatch { .. }
                | FrameError::VersionMismatch { .. }
                | FrameError::InvalidLength { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Errors in the content of a `PowFunc` payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// The payload is missing the difficulty byte.
    #[error("empty pow request payload")]
    Empty,

    /// Min weight magnitude outside the accepted range.
    #[error("minWeightMagnitude out of range [0-{max}]: {value}")]
    DifficultyOutOfRange { value: u32, max: u8 },

    /// A byte outside the tryte alphabet.
    #[error("invalid tryte {byte:#04x} at offset {offset}")]
    InvalidTryte { offset: usize, byte: u8 },
}
