// Engine error types and constants

use crate::error::{DecodeError, ErrorCode};
use log::error;
use std::fmt;

/// Engine error code constants
///
/// These constants are the single source of truth for the codes reported
/// through logs and the JNI boundary.
///
/// Error code range: 4001-4010
pub struct EngineErrorCodes {}

impl EngineErrorCodes {
    /// Every mixing slot is occupied
    pub const FULL: i32 = 4001;

    /// The sample buffer was unloaded while still referenced
    pub const BUFFER_INVALIDATED: i32 = 4002;

    /// Output device missing or disconnected
    pub const DEVICE_UNAVAILABLE: i32 = 4003;

    /// Channel count outside {1, 2}
    pub const INVALID_CHANNEL_COUNT: i32 = 4004;

    /// Slot index outside the bus capacity or not attached
    pub const INVALID_SLOT: i32 = 4005;

    /// Operation needs an open stream
    pub const STREAM_NOT_OPEN: i32 = 4006;

    /// Failed to open audio stream
    pub const STREAM_OPEN_FAILED: i32 = 4007;

    /// Failed to start or stop an open stream
    pub const STREAM_START_FAILED: i32 = 4008;

    /// BPM value is invalid (must be > 0)
    pub const BPM_INVALID: i32 = 4009;

    /// Asset could not be decoded
    pub const DECODE_FAILED: i32 = 4010;
}

/// Log an engine error with structured context
///
/// The logging is non-blocking and will not panic on failure. Never call
/// this from the audio callback.
pub fn log_engine_error(err: &EngineError, context: &str) {
    error!(
        "Engine error in {}: code={}, component=MixingEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Engine and stream lifecycle errors
///
/// Error code range: 4001-4010
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// No free slot left on the mix bus
    Full { capacity: usize },

    /// The referenced buffer has been unloaded
    BufferInvalidated,

    /// Output device missing or gone
    DeviceUnavailable { reason: String },

    /// Only mono and stereo streams are supported
    InvalidChannelCount { channels: u16 },

    /// Slot index is out of range, or names an empty slot on the player
    InvalidSlot { slot: usize },

    /// No stream has been opened
    StreamNotOpen,

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Failed to start or stop the stream
    StreamStartFailed { reason: String },

    /// BPM value is invalid (must be > 0)
    BpmInvalid { bpm: u32 },

    /// Asset bytes could not be decoded
    Decode(DecodeError),
}

impl ErrorCode for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::Full { .. } => EngineErrorCodes::FULL,
            EngineError::BufferInvalidated => EngineErrorCodes::BUFFER_INVALIDATED,
            EngineError::DeviceUnavailable { .. } => EngineErrorCodes::DEVICE_UNAVAILABLE,
            EngineError::InvalidChannelCount { .. } => EngineErrorCodes::INVALID_CHANNEL_COUNT,
            EngineError::InvalidSlot { .. } => EngineErrorCodes::INVALID_SLOT,
            EngineError::StreamNotOpen => EngineErrorCodes::STREAM_NOT_OPEN,
            EngineError::StreamOpenFailed { .. } => EngineErrorCodes::STREAM_OPEN_FAILED,
            EngineError::StreamStartFailed { .. } => EngineErrorCodes::STREAM_START_FAILED,
            EngineError::BpmInvalid { .. } => EngineErrorCodes::BPM_INVALID,
            EngineError::Decode(_) => EngineErrorCodes::DECODE_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            EngineError::Full { capacity } => {
                format!("All {} sample slots are in use", capacity)
            }
            EngineError::BufferInvalidated => "Sample buffer has been unloaded".to_string(),
            EngineError::DeviceUnavailable { reason } => {
                format!("Output device unavailable: {}", reason)
            }
            EngineError::InvalidChannelCount { channels } => {
                format!("Channel count must be 1 or 2 (got {})", channels)
            }
            EngineError::InvalidSlot { slot } => format!("No sample source at slot {}", slot),
            EngineError::StreamNotOpen => {
                "Audio stream not open. Call setup_audio_stream() first.".to_string()
            }
            EngineError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            EngineError::StreamStartFailed { reason } => {
                format!("Failed to start audio stream: {}", reason)
            }
            EngineError::BpmInvalid { bpm } => {
                format!("BPM must be greater than 0 (got {})", bpm)
            }
            EngineError::Decode(err) => format!("Asset decode failed: {}", err.message()),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DecodeError> for EngineError {
    fn from(err: DecodeError) -> Self {
        EngineError::Decode(err)
    }
}
