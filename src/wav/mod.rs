// WAV module - RIFF/WAVE asset decoding

pub mod format;
pub mod reader;

pub use format::{AudioFormat, SampleEncoding};
pub use reader::WavReader;
