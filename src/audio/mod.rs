// Audio module - decoded sample storage and playback sources

pub mod sample_buffer;
pub mod source;

// Re-export commonly used types for convenience
pub use sample_buffer::SampleBuffer;
pub use source::{PanLaw, SampleSource, SourceKind, SourceState};
