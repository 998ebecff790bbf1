//! Command codes.
//!
//! Codes are fixed constants shared by client and server builds. Decoded
//! frames keep the raw byte so that an unknown code can still be answered
//! with an `Error` frame.

use std::fmt;

/// Operations and reply kinds carried in the command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Successful reply.
    Response = 0x00,
    /// Failed reply; payload is a UTF-8 message.
    Error = 0x01,
    /// Reserved for server-initiated messages.
    Notification = 0x02,
    /// Query the server version string.
    GetServerVersion = 0x03,
    /// Query the PoW device type.
    GetPowType = 0x04,
    /// Query the PoW device version.
    GetPowVersion = 0x05,
    /// Run a PoW computation.
    PowFunc = 0x06,
    /// (Re)initialize the PoW devices.
    InitPow = 0x07,
}

impl Command {
    /// All known commands, in code order.
    pub const ALL: [Command; 8] = [
        Command::Response,
        Command::Error,
        Command::Notification,
        Command::GetServerVersion,
        Command::GetPowType,
        Command::GetPowVersion,
        Command::PowFunc,
        Command::InitPow,
    ];

    /// Look up a command by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Command::Response => "Response",
            Command::Error => "Error",
            Command::Notification => "Notification",
            Command::GetServerVersion => "GetServerVersion",
            Command::GetPowType => "GetPowType",
            Command::GetPowVersion => "GetPowVersion",
            Command::PowFunc => "PowFunc",
            Command::InitPow => "InitPow",
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> u8 {
        command.code()
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        Command::from_code(code).ok_or(code)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name for a raw command byte, `"UNKNOWN"` for unassigned codes.
pub fn command_name(code: u8) -> &'static str {
    Command::from_code(code).map_or("UNKNOWN", Command::name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip_through_table() {
        for command in Command::ALL {
            assert_eq!(Command::from_code(command.code()), Some(command));
            assert_eq!(Command::try_from(u8::from(command)), Ok(command));
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(Command::from_code(0x08), None);
        assert_eq!(Command::try_from(0xFF), Err(0xFF));
        assert_eq!(command_name(0x42), "UNKNOWN");
    }

    #[test]
    fn display_uses_name() {
        assert_eq!(Command::PowFunc.to_string(), "PowFunc");
    }
}
