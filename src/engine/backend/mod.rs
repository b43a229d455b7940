//! Backend abstractions for the stream lifecycle controller.
//!
//! A backend owns exactly one output stream at a time. The player builds a
//! fresh [`Renderer`] for every open and hands it over; the backend moves it
//! into the driver callback and drops it when the stream is closed.

use std::sync::Arc;

use crate::error::EngineError;

use super::mixer::{MixBus, Renderer};

/// Parameters for opening an output stream.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub channel_count: u16,
    pub sample_rate: u32,
    /// Bus whose output-reset flag the driver's error callback must raise.
    pub bus: Arc<MixBus>,
}

/// What the driver actually granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub channel_count: u16,
    pub sample_rate: u32,
}

/// Trait implemented by platform-specific output backends.
///
/// Not `Send`: some drivers (cpal on macOS) hand out thread-bound stream
/// handles, so the player stays on the thread that created it.
pub trait AudioBackend {
    /// Open a stream and install `renderer` as its data callback.
    fn open(&mut self, request: &StreamRequest, renderer: Renderer)
        -> Result<StreamInfo, EngineError>;
    fn start(&mut self) -> Result<(), EngineError>;
    fn stop(&mut self) -> Result<(), EngineError>;
    /// Close the stream and drop its renderer. No-op when already closed.
    fn close(&mut self);
    fn is_open(&self) -> bool;
}

#[cfg(target_os = "android")]
mod oboe;
#[cfg(target_os = "android")]
pub use self::oboe::OboeBackend;

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use self::cpal::CpalBackend;

mod offline;
pub use offline::OfflineBackend;

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        /// Backend used by [`crate::engine::MetronomePlayer::new`].
        pub type PlatformBackend = OboeBackend;
    } else {
        /// Backend used by [`crate::engine::MetronomePlayer::new`].
        pub type PlatformBackend = CpalBackend;
    }
}
