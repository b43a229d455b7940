//! Engine module housing the real-time playback core.
//!
//! `mixer` holds the state shared with the audio thread and the renderer
//! that runs inside the driver callback, `backend` abstracts the output
//! drivers, and `player` is the control-thread lifecycle controller.

pub mod backend;
pub mod mixer;
pub mod player;

#[cfg(target_os = "android")]
pub use backend::OboeBackend;
#[cfg(not(target_os = "android"))]
pub use backend::CpalBackend;
pub use backend::{AudioBackend, OfflineBackend, PlatformBackend, StreamInfo, StreamRequest};
pub use mixer::{MixBus, Renderer};
pub use player::{GainTarget, MetronomePlayer, PlayerControl, SlotHandle, StreamState};
