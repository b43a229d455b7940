use crate::engine::mixer::{MixBus, Renderer};
use crate::error::EngineError;

use std::sync::Arc;

use super::{AudioBackend, StreamInfo, StreamRequest};

/// Offline backend used for deterministic testing and CLI rendering.
///
/// There is no driver thread: the caller pulls audio with [`render`], which
/// runs the renderer exactly like a driver callback would. Driver failures
/// can be injected with [`fail_next_open`] and [`simulate_disconnect`].
///
/// [`render`]: OfflineBackend::render
/// [`fail_next_open`]: OfflineBackend::fail_next_open
/// [`simulate_disconnect`]: OfflineBackend::simulate_disconnect
#[derive(Default)]
pub struct OfflineBackend {
    renderer: Option<Renderer>,
    bus: Option<Arc<MixBus>>,
    info: Option<StreamInfo>,
    started: bool,
    open_failure: Option<String>,
    opens: usize,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail with `StreamOpenFailed`.
    pub fn fail_next_open(&mut self, reason: impl Into<String>) {
        self.open_failure = Some(reason.into());
    }

    /// Behave like a driver that lost its device: raise the output-reset
    /// flag and tear the stream down underneath the player.
    pub fn simulate_disconnect(&mut self) {
        if let Some(bus) = &self.bus {
            bus.raise_output_reset();
        }
        self.renderer = None;
        self.started = false;
    }

    /// Pull one callback's worth of interleaved frames.
    ///
    /// Returns false (and writes silence) unless the stream is started.
    pub fn render(&mut self, output: &mut [f32]) -> bool {
        match (&mut self.renderer, self.started) {
            (Some(renderer), true) => {
                renderer.render(output);
                true
            }
            _ => {
                output.fill(0.0);
                false
            }
        }
    }

    /// Render `frames` frames in callbacks of `burst` frames.
    pub fn render_frames(&mut self, frames: usize, burst: usize) -> Vec<f32> {
        let channels = self.info.map_or(1, |info| info.channel_count as usize);
        let mut output = vec![0.0; frames * channels];
        for chunk in output.chunks_mut(burst.max(1) * channels) {
            self.render(chunk);
        }
        output
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.info
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens
    }
}

impl AudioBackend for OfflineBackend {
    fn open(
        &mut self,
        request: &StreamRequest,
        renderer: Renderer,
    ) -> Result<StreamInfo, EngineError> {
        self.close();

        if let Some(reason) = self.open_failure.take() {
            return Err(EngineError::StreamOpenFailed { reason });
        }
        if !(1..=2).contains(&request.channel_count) {
            return Err(EngineError::InvalidChannelCount {
                channels: request.channel_count,
            });
        }

        let info = StreamInfo {
            channel_count: request.channel_count,
            sample_rate: request.sample_rate,
        };
        self.renderer = Some(renderer);
        self.bus = Some(Arc::clone(&request.bus));
        self.info = Some(info);
        self.opens += 1;
        Ok(info)
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if self.renderer.is_none() {
            return Err(EngineError::StreamNotOpen);
        }
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        if self.renderer.is_none() {
            return Err(EngineError::StreamNotOpen);
        }
        self.started = false;
        Ok(())
    }

    fn close(&mut self) {
        self.renderer = None;
        self.started = false;
    }

    fn is_open(&self) -> bool {
        self.renderer.is_some()
    }
}
