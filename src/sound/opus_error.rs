//! Opus codec status codes
//!
//! Numeric codes follow the libopusfile convention so they can cross the C
//! boundary unchanged. The text attached to each code is for diagnostics
//! only; callers never branch on it.

use std::fmt;

/// Failure codes reported by the codec layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OpusStatus {
    /// A request did not succeed
    False = -1,
    /// Currently unused
    Eof = -2,
    /// A gap in the data; decoding can continue past it
    Hole = -3,
    /// An underlying read, seek or tell failed
    Read = -128,
    /// Internal memory allocation or library failure
    Fault = -129,
    /// The stream uses a feature that is not implemented
    Impl = -130,
    /// Invalid parameters
    Inval = -131,
    /// Not an Ogg Opus stream
    NotFormat = -132,
    /// A required header packet was missing or malformed
    BadHeader = -133,
    /// Unrecognized header version
    Version = -134,
    NotAudio = -135,
    /// An audio packet failed to decode
    BadPacket = -136,
    /// Seeking failed to find the requested data
    BadLink = -137,
    /// The stream is not seekable
    NoSeek = -138,
    /// First or last timestamp of a link failed validity checks
    BadTimestamp = -139,
}

impl OpusStatus {
    /// Look up a raw status code
    pub fn from_code(code: i32) -> Option<Self> {
        let status = match code {
            -1 => OpusStatus::False,
            -2 => OpusStatus::Eof,
            -3 => OpusStatus::Hole,
            -128 => OpusStatus::Read,
            -129 => OpusStatus::Fault,
            -130 => OpusStatus::Impl,
            -131 => OpusStatus::Inval,
            -132 => OpusStatus::NotFormat,
            -133 => OpusStatus::BadHeader,
            -134 => OpusStatus::Version,
            -135 => OpusStatus::NotAudio,
            -136 => OpusStatus::BadPacket,
            -137 => OpusStatus::BadLink,
            -138 => OpusStatus::NoSeek,
            -139 => OpusStatus::BadTimestamp,
            _ => return None,
        };
        Some(status)
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// True for conditions decoding can continue past
    pub fn is_recoverable(self) -> bool {
        self == OpusStatus::Hole
    }

    /// Human readable description
    pub fn message(self) -> &'static str {
        match self {
            OpusStatus::False => "Request did not succeed",
            OpusStatus::Hole => {
                "There was a hole in the data and some samples may have been skipped"
            }
            OpusStatus::Read => "An underlying read, seek, or tell operation failed",
            OpusStatus::Fault => "Internal memory allocation or library error",
            OpusStatus::Impl => "Unimplemented feature used in stream",
            OpusStatus::Inval => "One or more parameters to a function were invalid",
            OpusStatus::NotFormat | OpusStatus::BadHeader => "Invalid Ogg Opus stream",
            OpusStatus::Version => "Unrecognized version number in header",
            OpusStatus::BadPacket => "Failed to decode audio packet",
            OpusStatus::BadLink => "Seeking error",
            OpusStatus::NoSeek => "Non-seekable stream",
            OpusStatus::BadTimestamp => {
                "Validity checks failed for first or last timestamp in a link"
            }
            OpusStatus::Eof | OpusStatus::NotAudio => "Unknown error",
        }
    }
}

impl fmt::Display for OpusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for OpusStatus {}

/// Describe a raw status code; unknown codes get a generic message
pub fn opus_error(code: i32) -> &'static str {
    OpusStatus::from_code(code).map_or("Unknown error", OpusStatus::message)
}
