// Metronome Player Core - Rust playback engine
// Real-time multi-sample playback with a lock-free mixing path

// Module declarations
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metronome;
pub mod wav;

#[cfg(target_os = "android")]
mod jni_bridge;

// Re-exports for convenience
pub use audio::{PanLaw, SampleBuffer, SampleSource, SourceKind, SourceState};
pub use config::{AppConfig, EngineConfig, MetronomeConfig};
pub use engine::{
    AudioBackend, GainTarget, MetronomePlayer, OfflineBackend, PlayerControl, SlotHandle,
    StreamState,
};
pub use error::{DecodeError, EngineError, ErrorCode, StoreError};
pub use logging::init_logging;
pub use wav::{AudioFormat, WavReader};
