//! Oboe output backend (AAudio / OpenSL ES)
//!
//! Oboe fixes the frame type of a callback at compile time, so the runtime
//! channel count picks one of two callback adapters. Both forward straight
//! into the renderer; neither allocates, locks, or logs.

use std::sync::Arc;

use oboe::{
    AudioOutputCallback, AudioOutputStreamSafe, AudioStream, AudioStreamAsync, AudioStreamBase,
    AudioStreamBuilder, DataCallbackResult, Mono, Output, PerformanceMode, SharingMode, Stereo,
};

use crate::engine::mixer::{MixBus, Renderer};
use crate::error::EngineError;

use super::{AudioBackend, StreamInfo, StreamRequest};

/// Mono output callback.
struct MonoCallback {
    renderer: Renderer,
    bus: Arc<MixBus>,
}

impl AudioOutputCallback for MonoCallback {
    type FrameType = (f32, Mono);

    fn on_audio_ready(
        &mut self,
        _stream: &mut dyn AudioOutputStreamSafe,
        frames: &mut [f32],
    ) -> DataCallbackResult {
        self.renderer.render(frames);
        DataCallbackResult::Continue
    }

    fn on_error_after_close(
        &mut self,
        _stream: &mut dyn AudioOutputStreamSafe,
        _error: oboe::Error,
    ) {
        self.bus.raise_output_reset();
    }
}

/// Stereo output callback.
struct StereoCallback {
    renderer: Renderer,
    bus: Arc<MixBus>,
}

impl AudioOutputCallback for StereoCallback {
    type FrameType = (f32, Stereo);

    fn on_audio_ready(
        &mut self,
        _stream: &mut dyn AudioOutputStreamSafe,
        frames: &mut [(f32, f32)],
    ) -> DataCallbackResult {
        self.renderer.render_stereo(frames);
        DataCallbackResult::Continue
    }

    fn on_error_after_close(
        &mut self,
        _stream: &mut dyn AudioOutputStreamSafe,
        _error: oboe::Error,
    ) {
        self.bus.raise_output_reset();
    }
}

enum OboeStream {
    Mono(AudioStreamAsync<Output, MonoCallback>),
    Stereo(AudioStreamAsync<Output, StereoCallback>),
}

impl OboeStream {
    fn start(&mut self) -> Result<(), oboe::Error> {
        match self {
            OboeStream::Mono(stream) => stream.start(),
            OboeStream::Stereo(stream) => stream.start(),
        }
    }

    fn stop(&mut self) -> Result<(), oboe::Error> {
        match self {
            OboeStream::Mono(stream) => stream.stop(),
            OboeStream::Stereo(stream) => stream.stop(),
        }
    }

    fn sample_rate(&self) -> i32 {
        match self {
            OboeStream::Mono(stream) => stream.get_sample_rate(),
            OboeStream::Stereo(stream) => stream.get_sample_rate(),
        }
    }
}

/// Android backend driving a low-latency exclusive Oboe output stream.
#[derive(Default)]
pub struct OboeBackend {
    stream: Option<OboeStream>,
}

impl OboeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for OboeBackend {
    fn open(
        &mut self,
        request: &StreamRequest,
        renderer: Renderer,
    ) -> Result<StreamInfo, EngineError> {
        self.close();

        let bus = Arc::clone(&request.bus);
        let stream = match request.channel_count {
            1 => AudioStreamBuilder::default()
                .set_performance_mode(PerformanceMode::LowLatency)
                .set_sharing_mode(SharingMode::Exclusive)
                .set_direction::<Output>()
                .set_sample_rate(request.sample_rate as i32)
                .set_channel_count::<Mono>()
                .set_format::<f32>()
                .set_callback(MonoCallback { renderer, bus })
                .open_stream()
                .map(OboeStream::Mono),
            2 => AudioStreamBuilder::default()
                .set_performance_mode(PerformanceMode::LowLatency)
                .set_sharing_mode(SharingMode::Exclusive)
                .set_direction::<Output>()
                .set_sample_rate(request.sample_rate as i32)
                .set_channel_count::<Stereo>()
                .set_format::<f32>()
                .set_callback(StereoCallback { renderer, bus })
                .open_stream()
                .map(OboeStream::Stereo),
            channels => return Err(EngineError::InvalidChannelCount { channels }),
        }
        .map_err(|e| EngineError::StreamOpenFailed {
            reason: format!("Output stream: {:?}", e),
        })?;

        let info = StreamInfo {
            channel_count: request.channel_count,
            sample_rate: stream.sample_rate().max(0) as u32,
        };
        self.stream = Some(stream);
        Ok(info)
    }

    fn start(&mut self) -> Result<(), EngineError> {
        let stream = self.stream.as_mut().ok_or(EngineError::StreamNotOpen)?;
        stream.start().map_err(|e| EngineError::StreamStartFailed {
            reason: format!("Failed to start output stream: {:?}", e),
        })
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        let stream = self.stream.as_mut().ok_or(EngineError::StreamNotOpen)?;
        stream.stop().map_err(|e| EngineError::DeviceUnavailable {
            reason: format!("Failed to stop output stream: {:?}", e),
        })
    }

    fn close(&mut self) {
        // Dropping the stream closes it and releases the callback.
        self.stream = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
