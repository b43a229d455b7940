//! CPAL output backend for desktop platforms (Linux, macOS, Windows)
//!
//! Used by the CLI and for running the player against real hardware during
//! development. Only `f32` output is supported.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;

use crate::engine::mixer::Renderer;
use crate::error::EngineError;

use super::{AudioBackend, StreamInfo, StreamRequest};

/// Desktop backend driving the host's default output device.
#[derive(Default)]
pub struct CpalBackend {
    stream: Option<cpal::Stream>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for CpalBackend {
    fn open(
        &mut self,
        request: &StreamRequest,
        mut renderer: Renderer,
    ) -> Result<StreamInfo, EngineError> {
        self.close();

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::DeviceUnavailable {
                reason: "No default output device found".to_string(),
            })?;

        let default_config =
            device
                .default_output_config()
                .map_err(|e| EngineError::StreamOpenFailed {
                    reason: format!("Failed to get default output config: {:?}", e),
                })?;

        if default_config.sample_format() != cpal::SampleFormat::F32 {
            return Err(EngineError::StreamOpenFailed {
                reason: "Only F32 sample format is currently supported for output".to_string(),
            });
        }

        let stream_config = cpal::StreamConfig {
            channels: request.channel_count,
            sample_rate: cpal::SampleRate(request.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let bus = Arc::clone(&request.bus);
        let err_fn = move |err: cpal::StreamError| {
            tracing::warn!("Output stream error: {}", err);
            bus.raise_output_reset();
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.render(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| EngineError::StreamOpenFailed {
                reason: format!("{:?}", e),
            })?;

        self.stream = Some(stream);
        Ok(StreamInfo {
            channel_count: request.channel_count,
            sample_rate: request.sample_rate,
        })
    }

    fn start(&mut self) -> Result<(), EngineError> {
        let stream = self.stream.as_ref().ok_or(EngineError::StreamNotOpen)?;
        stream.play().map_err(|e| EngineError::StreamStartFailed {
            reason: format!("Failed to start output stream: {:?}", e),
        })
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        let stream = self.stream.as_ref().ok_or(EngineError::StreamNotOpen)?;
        stream.pause().map_err(|e| EngineError::DeviceUnavailable {
            reason: format!("Failed to stop output stream: {:?}", e),
        })
    }

    fn close(&mut self) {
        self.stream = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
