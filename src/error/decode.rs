// WAV decode error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Decode error code constants
///
/// Error code range: 3001-3004
pub struct DecodeErrorCodes {}

impl DecodeErrorCodes {
    /// Buffer does not start with a RIFF/WAVE header
    pub const BAD_MAGIC: i32 = 3001;

    /// Encoding, bit depth or channel layout is not supported
    pub const UNSUPPORTED_FORMAT: i32 = 3002;

    /// A chunk declares more bytes than the buffer holds
    pub const TRUNCATED: i32 = 3003;

    /// A required chunk is absent
    pub const MISSING_CHUNK: i32 = 3004;
}

/// Log a decode error with structured context
///
/// Decode failures collapse to a single validity boolean at the boundary,
/// so this log line is the only place the specific cause is recorded.
pub fn log_decode_error(err: &DecodeError, context: &str) {
    error!(
        "Decode error in {}: code={}, component=WavReader, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors produced while parsing a RIFF/WAVE byte buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Missing "RIFF" or "WAVE" identifiers
    BadMagic,

    /// Compression code, bit depth, or channel count the engine cannot play
    UnsupportedFormat { reason: String },

    /// Declared size runs past the end of the buffer
    Truncated { needed: usize, available: usize },

    /// `fmt ` chunk was never seen before the end of the buffer
    MissingChunk { id: &'static str },
}

impl ErrorCode for DecodeError {
    fn code(&self) -> i32 {
        match self {
            DecodeError::BadMagic => DecodeErrorCodes::BAD_MAGIC,
            DecodeError::UnsupportedFormat { .. } => DecodeErrorCodes::UNSUPPORTED_FORMAT,
            DecodeError::Truncated { .. } => DecodeErrorCodes::TRUNCATED,
            DecodeError::MissingChunk { .. } => DecodeErrorCodes::MISSING_CHUNK,
        }
    }

    fn message(&self) -> String {
        match self {
            DecodeError::BadMagic => "Not a RIFF/WAVE buffer".to_string(),
            DecodeError::UnsupportedFormat { reason } => {
                format!("Unsupported WAV format: {}", reason)
            }
            DecodeError::Truncated { needed, available } => {
                format!(
                    "Truncated WAV data: need {} bytes, {} available",
                    needed, available
                )
            }
            DecodeError::MissingChunk { id } => format!("Missing '{}' chunk", id),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DecodeError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for DecodeError {}
