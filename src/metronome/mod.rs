// Metronome module - rhythm model, click synthesis, beat scheduling and
// rhythm persistence

pub mod click;
pub mod controller;
pub mod rhythm;
pub mod store;

pub use click::{click_sample_buffer, generate_click_sample, is_on_beat, samples_per_beat};
pub use controller::{
    ClickSink, ManualTimeSource, MetronomeController, SystemTimeSource, TimeSource,
};
pub use rhythm::{emphasis_pattern, RhythmModel, MAX_BPM, MAX_GROUP_BEATS, MIN_BPM};
pub use store::{JsonRhythmStore, RhythmStore};
