//! Framing for the powsrv protocol.
//!
//! Every message is framed with:
//! - a sync byte (`0x05`, ENQ) for stream resynchronization
//! - a protocol version byte (`0x01`)
//! - a 2-byte big-endian length covering request id, command and payload
//! - a 1-byte request id and a 1-byte command
//! - a trailing CRC-8 over request id, command and payload
//!
//! The decoder is a resumable state machine: feed it whatever the socket
//! returned and it hands back complete, checksum-valid frames.

pub mod checksum;
pub mod codec;
pub mod command;
pub mod error;
pub mod payload;
pub mod reader;
pub mod writer;

pub use checksum::checksum;
pub use codec::{
    encode_frame, DecodeState, Frame, FrameConfig, FrameDecoder, HEADER_SIZE, MAX_PAYLOAD, SYNC,
    TRAILER_SIZE, VERSION,
};
pub use command::{command_name, Command};
pub use error::{FrameError, PayloadError, Result};
pub use payload::{validate_trytes, PowRequest, MAX_MIN_WEIGHT_MAGNITUDE, TRYTE_ALPHABET};
pub use reader::FrameReader;
pub use writer::FrameWriter;
