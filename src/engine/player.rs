//! MetronomePlayer: stream lifecycle and sample registry.
//!
//! The player is the control-thread half of the engine. It owns the backend,
//! the registry of loaded sample sources, and the producer side of the
//! renderer's command queue. Fire-and-forget operations (trigger, stop,
//! gain, output-reset polling) go through [`PlayerControl`], a cheap
//! `Send + Sync` handle that only touches atomics on the mix bus.

use std::collections::VecDeque;
use std::sync::Arc;

use rtrb::{Producer, PushError};
use serde::{Deserialize, Serialize};

use crate::audio::{SampleBuffer, SampleSource, SourceState};
use crate::config::EngineConfig;
use crate::error::{log_decode_error, log_engine_error, EngineError};
use crate::wav::WavReader;

use super::backend::{AudioBackend, PlatformBackend, StreamInfo, StreamRequest};
use super::mixer::{MixBus, MixCommand, RenderSpec, Renderer};

/// Externally visible stream lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Closed,
    Open,
    Started,
    /// The driver reported a disconnect; the stream must be restarted.
    ResetPending,
}

/// Which gain a `set_gain` call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainTarget {
    Master,
    Source(usize),
}

impl GainTarget {
    /// Map a boundary slot number: 0 is the master bus, `n > 0` is source
    /// slot `n`. Negative values address nothing.
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(GainTarget::Master),
            n if n > 0 => Some(GainTarget::Source(n as usize)),
            _ => None,
        }
    }
}

/// Slot assigned to a sample source by [`MetronomePlayer::add_sample_source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle(usize);

impl SlotHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Lock-free control handle, safe to clone across threads.
///
/// Never blocks: every method is a handful of atomic operations.
#[derive(Debug, Clone)]
pub struct PlayerControl {
    bus: Arc<MixBus>,
}

impl PlayerControl {
    /// Start (or restart) the source at `slot` from frame 0.
    ///
    /// Only the slot range is checked here; a request for an empty slot is
    /// a no-op.
    pub fn trigger_down(&self, slot: usize) -> Result<(), EngineError> {
        if self.bus.trigger(slot) {
            Ok(())
        } else {
            Err(EngineError::InvalidSlot { slot })
        }
    }

    pub fn stop_source(&self, slot: usize) -> Result<(), EngineError> {
        if self.bus.stop(slot) {
            Ok(())
        } else {
            Err(EngineError::InvalidSlot { slot })
        }
    }

    /// Set a gain. Negative and NaN values are stored as 0.
    pub fn set_gain(&self, target: GainTarget, gain: f32) -> Result<(), EngineError> {
        match target {
            GainTarget::Master => {
                self.bus.set_master_gain(gain);
                Ok(())
            }
            GainTarget::Source(slot) => {
                if self.bus.set_slot_gain(slot, gain) {
                    Ok(())
                } else {
                    Err(EngineError::InvalidSlot { slot })
                }
            }
        }
    }

    /// `set_gain` addressed by boundary slot number (see [`GainTarget::from_index`]).
    pub fn set_gain_at(&self, index: i32, gain: f32) -> Result<(), EngineError> {
        match GainTarget::from_index(index) {
            Some(target) => self.set_gain(target, gain),
            None => {
                tracing::debug!("Ignoring gain for negative slot {}", index);
                Ok(())
            }
        }
    }

    pub fn master_gain(&self) -> f32 {
        self.bus.master_gain()
    }

    /// Sticky flag raised when the driver lost the output device.
    pub fn get_output_reset(&self) -> bool {
        self.bus.output_reset()
    }

    pub fn clear_output_reset(&self) {
        self.bus.clear_output_reset();
    }

    /// Last state published for `slot`.
    pub fn source_state(&self, slot: usize) -> Option<SourceState> {
        self.bus.slot_state(slot)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.bus.frames_rendered()
    }
}

/// Sources detached from the renderer, held until it acknowledges the
/// detach so the final `Arc` release never happens on the audio thread.
struct PendingRelease {
    generation: u64,
    _sources: Vec<SampleSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Closed,
    Open,
    Started,
}

/// Multi-sample player driving one output stream.
pub struct MetronomePlayer<B: AudioBackend> {
    config: EngineConfig,
    backend: B,
    bus: Arc<MixBus>,
    channel_count: Option<u16>,
    lifecycle: Lifecycle,
    stream_info: Option<StreamInfo>,
    registry: Vec<Option<SampleSource>>,
    commands: Option<Producer<MixCommand>>,
    backlog: VecDeque<MixCommand>,
    pending_release: Vec<PendingRelease>,
    detach_generation: u64,
}

impl MetronomePlayer<PlatformBackend> {
    /// Create a player on the platform's native output backend.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_backend(config, PlatformBackend::default())
    }
}

impl<B: AudioBackend> MetronomePlayer<B> {
    pub fn with_backend(config: EngineConfig, backend: B) -> Self {
        let capacity = config.max_sources.max(1);
        Self {
            bus: Arc::new(MixBus::new(capacity)),
            registry: (0..capacity).map(|_| None).collect(),
            config,
            backend,
            channel_count: None,
            lifecycle: Lifecycle::Closed,
            stream_info: None,
            commands: None,
            backlog: VecDeque::new(),
            pending_release: Vec::new(),
            detach_generation: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn control(&self) -> PlayerControl {
        PlayerControl {
            bus: Arc::clone(&self.bus),
        }
    }

    pub fn capacity(&self) -> usize {
        self.registry.len()
    }

    pub fn source_count(&self) -> usize {
        self.registry.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.stream_info
    }

    pub fn stream_state(&self) -> StreamState {
        match self.lifecycle {
            Lifecycle::Closed => StreamState::Closed,
            _ if self.bus.output_reset() => StreamState::ResetPending,
            Lifecycle::Open => StreamState::Open,
            Lifecycle::Started => StreamState::Started,
        }
    }

    // ── Stream lifecycle ────────────────────────────────────────────────

    /// Choose the output channel count and open a stream.
    ///
    /// Returns false (and logs) for channel counts other than 1 or 2, or if
    /// the driver refuses the stream.
    pub fn setup_audio_stream(&mut self, channel_count: u16) -> bool {
        if !(1..=2).contains(&channel_count) {
            log_engine_error(
                &EngineError::InvalidChannelCount {
                    channels: channel_count,
                },
                "setup_audio_stream",
            );
            return false;
        }
        self.channel_count = Some(channel_count);
        self.open_stream()
    }

    /// Open (or reopen) the stream with the configured channel count.
    pub fn open_stream(&mut self) -> bool {
        match self.try_open_stream() {
            Ok(info) => {
                tracing::info!(
                    "Output stream opened: {} ch @ {} Hz",
                    info.channel_count,
                    info.sample_rate
                );
                true
            }
            Err(err) => {
                log_engine_error(&err, "open_stream");
                false
            }
        }
    }

    pub fn start_stream(&mut self) -> bool {
        match self.try_start_stream() {
            Ok(()) => {
                tracing::info!("Output stream started");
                true
            }
            Err(err) => {
                log_engine_error(&err, "start_stream");
                false
            }
        }
    }

    /// Stop and close the stream. Loaded samples stay registered.
    pub fn teardown_audio_stream(&mut self) {
        self.close_stream();
        tracing::info!("Output stream closed");
    }

    /// Recover from a driver disconnect: close, stop every source, reopen
    /// with the same channel count and start.
    pub fn restart_stream(&mut self) -> bool {
        tracing::info!("Restarting output stream");
        self.close_stream();
        self.reset_all();
        self.open_stream() && self.start_stream()
    }

    fn try_open_stream(&mut self) -> Result<StreamInfo, EngineError> {
        let channel_count = self
            .channel_count
            .ok_or(EngineError::InvalidChannelCount { channels: 0 })?;

        self.close_stream();

        let (producer, renderer) = self.build_renderer(channel_count);
        let request = StreamRequest {
            channel_count,
            sample_rate: self.config.sample_rate,
            bus: Arc::clone(&self.bus),
        };
        let info = self.backend.open(&request, renderer)?;

        if info.sample_rate != self.config.sample_rate {
            tracing::warn!(
                "Driver granted {} Hz instead of {} Hz; assets loaded later follow the stream rate",
                info.sample_rate,
                self.config.sample_rate
            );
        }

        self.commands = Some(producer);
        self.stream_info = Some(info);
        self.lifecycle = Lifecycle::Open;
        Ok(info)
    }

    fn try_start_stream(&mut self) -> Result<(), EngineError> {
        if self.lifecycle == Lifecycle::Closed {
            return Err(EngineError::StreamNotOpen);
        }
        self.backend.start()?;
        self.lifecycle = Lifecycle::Started;
        Ok(())
    }

    /// Renderer for a new stream, pre-loaded with every registered source.
    fn build_renderer(&self, channel_count: u16) -> (Producer<MixCommand>, Renderer) {
        let (producer, mut renderer) = Renderer::new(
            Arc::clone(&self.bus),
            RenderSpec {
                channel_count,
                frames_per_block: self.config.frames_per_block,
                command_capacity: self.config.command_queue_capacity,
                clip_output: self.config.clip_output,
            },
        );

        for (slot, entry) in self.registry.iter().enumerate() {
            if let Some(source) = entry {
                renderer.attach(slot, source.clone(), self.bus.counters(slot));
            }
        }

        (producer, renderer)
    }

    fn close_stream(&mut self) {
        if self.lifecycle == Lifecycle::Started && self.backend.is_open() {
            if let Err(err) = self.backend.stop() {
                tracing::warn!("Stopping output stream failed: {}", err);
            }
        }
        self.backend.close();

        // The renderer is gone, so nothing on the audio side still holds
        // detached buffers.
        self.commands = None;
        self.backlog.clear();
        self.pending_release.clear();
        self.stream_info = None;
        self.lifecycle = Lifecycle::Closed;
    }

    // ── Sample registry ─────────────────────────────────────────────────

    /// Register a source in the first free slot.
    ///
    /// # Errors
    /// `Full` when every slot is taken, `BufferInvalidated` if the source's
    /// buffer was already unloaded.
    pub fn add_sample_source(&mut self, source: SampleSource) -> Result<SlotHandle, EngineError> {
        self.collect_garbage();

        if !source.buffer().is_valid() {
            return Err(EngineError::BufferInvalidated);
        }

        let slot = self
            .registry
            .iter()
            .position(|entry| entry.is_none())
            .ok_or(EngineError::Full {
                capacity: self.registry.len(),
            })?;

        self.bus.set_slot_gain(slot, source.gain());
        self.bus.publish_state(slot, SourceState::Idle);
        self.registry[slot] = Some(source.clone());

        if self.commands.is_some() {
            let counters = self.bus.counters(slot);
            self.send(MixCommand::Attach {
                slot,
                source,
                counters,
            });
        }

        tracing::debug!("Sample source attached to slot {}", slot);
        Ok(SlotHandle(slot))
    }

    /// Unload every registered buffer and free all slots.
    ///
    /// Sources that are mid-playback finish silently on their next block.
    pub fn unload_sample_data(&mut self) {
        let sources: Vec<SampleSource> = self
            .registry
            .iter_mut()
            .filter_map(|entry| entry.take())
            .collect();

        for source in &sources {
            source.buffer().unload();
        }
        for slot in 0..self.registry.len() {
            self.bus.publish_state(slot, SourceState::Idle);
        }

        let count = sources.len();
        if self.commands.is_some() {
            self.detach_generation += 1;
            let generation = self.detach_generation;
            self.send(MixCommand::DetachAll { generation });
            self.pending_release.push(PendingRelease {
                generation,
                _sources: sources,
            });
        }

        tracing::info!("Unloaded {} sample source(s)", count);
    }

    /// Release detached sources the renderer no longer references and
    /// retry queued commands.
    pub fn collect_garbage(&mut self) {
        self.flush_backlog();
        let acknowledged = self.bus.acknowledged_detach();
        self.pending_release
            .retain(|pending| pending.generation > acknowledged);
    }

    /// Number of detach generations still waiting for the renderer.
    pub fn pending_release_count(&self) -> usize {
        self.pending_release.len()
    }

    /// Decode a WAV asset and register it as a centered one-shot source.
    ///
    /// Returns true only if decoding succeeded and the asset has
    /// `expected_channels` channels. A channel mismatch is logged but the
    /// sample is still registered; decode failures register nothing.
    pub fn load_wav_asset(&mut self, bytes: &[u8], expected_channels: u16) -> bool {
        match self.try_load_wav(bytes) {
            Ok((slot, channels)) => {
                if channels != expected_channels {
                    tracing::warn!(
                        "WAV asset in slot {} has {} channel(s), expected {}",
                        slot.index(),
                        channels,
                        expected_channels
                    );
                    false
                } else {
                    true
                }
            }
            Err(EngineError::Decode(err)) => {
                log_decode_error(&err, "load_wav_asset");
                false
            }
            Err(err) => {
                log_engine_error(&err, "load_wav_asset");
                false
            }
        }
    }

    fn try_load_wav(&mut self, bytes: &[u8]) -> Result<(SlotHandle, u16), EngineError> {
        let reader = WavReader::parse(bytes)?;
        let channels = reader.channel_count();
        let mut buffer = SampleBuffer::load_sample_data(&reader);

        let target_rate = self
            .stream_info
            .map_or(self.config.sample_rate, |info| info.sample_rate);
        if buffer.sample_rate() != target_rate {
            tracing::debug!(
                "Resampling asset from {} Hz to {} Hz",
                buffer.sample_rate(),
                target_rate
            );
            buffer = buffer.resampled(target_rate);
        }

        let source =
            SampleSource::one_shot(Arc::new(buffer), 0.0).with_pan_law(self.config.pan_law);
        let slot = self.add_sample_source(source)?;
        Ok((slot, channels))
    }

    // ── Playback control ────────────────────────────────────────────────

    /// Start (or restart) the source at `slot`. Fails with `InvalidSlot`
    /// when no source is registered there.
    pub fn trigger_down(&mut self, slot: usize) -> Result<(), EngineError> {
        self.collect_garbage();
        self.registered(slot)?;
        self.control().trigger_down(slot)
    }

    pub fn stop_source(&mut self, slot: usize) -> Result<(), EngineError> {
        self.registered(slot)?;
        self.control().stop_source(slot)
    }

    fn registered(&self, slot: usize) -> Result<(), EngineError> {
        match self.registry.get(slot) {
            Some(Some(_)) => Ok(()),
            _ => Err(EngineError::InvalidSlot { slot }),
        }
    }

    pub fn set_gain(&mut self, target: GainTarget, gain: f32) -> Result<(), EngineError> {
        self.control().set_gain(target, gain)
    }

    pub fn set_gain_at(&mut self, index: i32, gain: f32) -> Result<(), EngineError> {
        self.control().set_gain_at(index, gain)
    }

    /// Stop every source and rewind it to frame 0.
    pub fn reset_all(&mut self) {
        self.bus.request_reset_all();
        for (slot, entry) in self.registry.iter().enumerate() {
            if entry.is_some() {
                self.bus.publish_state(slot, SourceState::Idle);
            }
        }
    }

    /// State of the source at `slot`, or `None` if the slot is empty.
    pub fn source_state(&self, slot: usize) -> Option<SourceState> {
        match self.registry.get(slot) {
            Some(Some(_)) => self.bus.slot_state(slot),
            _ => None,
        }
    }

    pub fn get_output_reset(&self) -> bool {
        self.bus.output_reset()
    }

    pub fn clear_output_reset(&self) {
        self.bus.clear_output_reset();
    }

    // ── Command queue ───────────────────────────────────────────────────

    fn send(&mut self, command: MixCommand) {
        self.backlog.push_back(command);
        self.flush_backlog();
    }

    fn flush_backlog(&mut self) {
        let Some(producer) = self.commands.as_mut() else {
            self.backlog.clear();
            return;
        };

        while let Some(command) = self.backlog.pop_front() {
            if let Err(PushError::Full(command)) = producer.push(command) {
                self.backlog.push_front(command);
                tracing::debug!("Mix command queue full; {} queued", self.backlog.len());
                break;
            }
        }
    }
}

impl<B: AudioBackend> Drop for MetronomePlayer<B> {
    fn drop(&mut self) {
        if self.lifecycle != Lifecycle::Closed {
            self.close_stream();
        }
    }
}
