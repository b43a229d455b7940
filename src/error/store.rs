// Rhythm persistence error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Store error code constants
///
/// Error code range: 5001-5003
pub struct StoreErrorCodes {}

impl StoreErrorCodes {
    /// Rhythm failed validation before being written
    pub const INVALID_RHYTHM: i32 = 5001;

    /// Reading or writing the backing file failed
    pub const IO: i32 = 5002;

    /// Stored data could not be parsed
    pub const FORMAT: i32 = 5003;
}

/// Log a store error with structured context
pub fn log_store_error(err: &StoreError, context: &str) {
    error!(
        "Store error in {}: code={}, component=RhythmStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors produced while saving or loading a rhythm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Empty divisions or a zero tempo
    InvalidRhythm { reason: String },

    /// Filesystem failure on the backing file
    Io { path: String, reason: String },

    /// JSON or division list that does not parse
    Format { reason: String },
}

impl ErrorCode for StoreError {
    fn code(&self) -> i32 {
        match self {
            StoreError::InvalidRhythm { .. } => StoreErrorCodes::INVALID_RHYTHM,
            StoreError::Io { .. } => StoreErrorCodes::IO,
            StoreError::Format { .. } => StoreErrorCodes::FORMAT,
        }
    }

    fn message(&self) -> String {
        match self {
            StoreError::InvalidRhythm { reason } => format!("Invalid rhythm: {}", reason),
            StoreError::Io { path, reason } => format!("I/O error on {}: {}", path, reason),
            StoreError::Format { reason } => format!("Malformed rhythm data: {}", reason),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for StoreError {}
