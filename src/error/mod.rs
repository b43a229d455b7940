// Error types for the metronome player
//
// This module defines custom error types for WAV decoding, engine
// operations and rhythm persistence, providing structured error handling
// with error codes suitable for reporting across the JNI boundary.

mod decode;
mod engine;
mod store;

pub use decode::{log_decode_error, DecodeError, DecodeErrorCodes};
pub use engine::{log_engine_error, EngineError, EngineErrorCodes};
pub use store::{log_store_error, StoreError, StoreErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the JNI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
