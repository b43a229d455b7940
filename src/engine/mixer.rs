//! Mixer - shared mix bus state and the audio-thread renderer
//!
//! The mix bus is split the same way the audio/analysis buffer pool used to
//! be: everything the control thread may touch while the stream runs is
//! either an atomic on [`MixBus`] or a message on a lock-free SPSC queue.
//!
//! ```text
//! control thread                          audio thread (Renderer)
//! ──────────────                          ───────────────────────
//! trigger/stop  ── request stamps ─────▶  newest request wins per callback
//! gains         ── f32 bits in AtomicU32 ▶ applied once per callback
//! reset_all     ── bus-wide stop stamp ─▶  stops every voice
//! attach/detach ── rtrb MixCommand ─────▶  voice table update
//!               ◀─ detach_ack ──────────  generation acknowledged
//! output reset  ◀─ sticky AtomicBool ───  raised by backend error callbacks
//! ```
//!
//! # Real-Time Safety
//! The renderer never allocates, locks, or logs. Voices dropped on the audio
//! thread only decrement reference counts: the player keeps its own
//! `Arc<SampleBuffer>` until `detach_ack` reaches the detach generation, so
//! the final release (and the free) always happens on the control thread.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::audio::{SampleSource, SourceState};

/// `f32` stored as raw bits for lock-free single-writer updates.
#[derive(Debug)]
pub struct AtomicGain(AtomicU32);

impl AtomicGain {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(sanitize_gain(value).to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(sanitize_gain(value).to_bits(), Ordering::Relaxed);
    }
}

#[inline]
fn sanitize_gain(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.max(0.0)
    }
}

/// Per-slot control block shared by both threads.
///
/// Trigger and stop requests are stamped from the bus-wide request clock,
/// so the renderer can tell which of several requests made between two
/// callbacks came last.
#[derive(Debug)]
pub struct SlotControl {
    trigger_stamp: AtomicU64,
    stop_stamp: AtomicU64,
    gain: AtomicGain,
    state: AtomicU8,
}

impl SlotControl {
    fn new() -> Self {
        Self {
            trigger_stamp: AtomicU64::new(0),
            stop_stamp: AtomicU64::new(0),
            gain: AtomicGain::new(1.0),
            state: AtomicU8::new(SourceState::Idle as u8),
        }
    }
}

/// Snapshot of a slot's request stamps, taken when a voice is attached so
/// that requests made before the attach are not replayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounters {
    pub trigger_stamp: u64,
    pub stop_stamp: u64,
    pub reset_stamp: u64,
}

/// Fixed-capacity bus state shared between the player and the renderer.
#[derive(Debug)]
pub struct MixBus {
    slots: Box<[SlotControl]>,
    master_gain: AtomicGain,
    output_reset: AtomicBool,
    request_clock: AtomicU64,
    reset_stamp: AtomicU64,
    detach_ack: AtomicU64,
    frames_rendered: AtomicU64,
}

impl MixBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| SlotControl::new()).collect(),
            master_gain: AtomicGain::new(1.0),
            output_reset: AtomicBool::new(false),
            request_clock: AtomicU64::new(0),
            reset_stamp: AtomicU64::new(0),
            detach_ack: AtomicU64::new(0),
            frames_rendered: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn next_stamp(&self) -> u64 {
        self.request_clock.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Request a (re)start of the voice at `slot`. Returns false if the
    /// slot index is out of range.
    pub fn trigger(&self, slot: usize) -> bool {
        match self.slots.get(slot) {
            Some(control) => {
                let stamp = self.next_stamp();
                control.trigger_stamp.fetch_max(stamp, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn stop(&self, slot: usize) -> bool {
        match self.slots.get(slot) {
            Some(control) => {
                let stamp = self.next_stamp();
                control.stop_stamp.fetch_max(stamp, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn set_slot_gain(&self, slot: usize, gain: f32) -> bool {
        match self.slots.get(slot) {
            Some(control) => {
                control.gain.store(gain);
                true
            }
            None => false,
        }
    }

    pub fn slot_gain(&self, slot: usize) -> Option<f32> {
        self.slots.get(slot).map(|control| control.gain.load())
    }

    pub fn set_master_gain(&self, gain: f32) {
        self.master_gain.store(gain);
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain.load()
    }

    /// Last state published for `slot` by the renderer (or the player while
    /// no stream is open).
    pub fn slot_state(&self, slot: usize) -> Option<SourceState> {
        self.slots
            .get(slot)
            .map(|control| SourceState::from_u8(control.state.load(Ordering::Acquire)))
    }

    pub(crate) fn publish_state(&self, slot: usize, state: SourceState) {
        if let Some(control) = self.slots.get(slot) {
            control.state.store(state as u8, Ordering::Release);
        }
    }

    pub(crate) fn counters(&self, slot: usize) -> SlotCounters {
        let reset_stamp = self.reset_stamp.load(Ordering::Acquire);
        self.slots
            .get(slot)
            .map(|control| SlotCounters {
                trigger_stamp: control.trigger_stamp.load(Ordering::Acquire),
                stop_stamp: control.stop_stamp.load(Ordering::Acquire),
                reset_stamp,
            })
            .unwrap_or(SlotCounters {
                reset_stamp,
                ..SlotCounters::default()
            })
    }

    /// Raise the sticky output-reset flag. Safe from driver error callbacks.
    pub fn raise_output_reset(&self) {
        self.output_reset.store(true, Ordering::Release);
    }

    pub fn output_reset(&self) -> bool {
        self.output_reset.load(Ordering::Acquire)
    }

    pub fn clear_output_reset(&self) {
        self.output_reset.store(false, Ordering::Release);
    }

    /// Stop every voice. Ordered against trigger and stop requests like a
    /// stop issued to each slot at once.
    pub(crate) fn request_reset_all(&self) {
        let stamp = self.next_stamp();
        self.reset_stamp.fetch_max(stamp, Ordering::Release);
    }

    /// Highest detach generation the renderer has fully applied.
    pub fn acknowledged_detach(&self) -> u64 {
        self.detach_ack.load(Ordering::Acquire)
    }

    /// Total frames written to the driver since the bus was created.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }
}

/// Structural changes sent from the control thread to the renderer.
pub enum MixCommand {
    /// Install `source` at `slot`, ignoring requests stamped before `counters`.
    Attach {
        slot: usize,
        source: SampleSource,
        counters: SlotCounters,
    },
    /// Drop every voice, then acknowledge `generation` on the bus.
    DetachAll { generation: u64 },
}

/// Fixed parameters of a renderer instance.
#[derive(Debug, Clone, Copy)]
pub struct RenderSpec {
    pub channel_count: u16,
    pub frames_per_block: usize,
    pub command_capacity: usize,
    pub clip_output: bool,
}

struct Voice {
    source: SampleSource,
    seen_trigger: u64,
    seen_stop: u64,
    seen_reset: u64,
}

/// Audio-thread half of the mixing engine.
///
/// Owned by exactly one driver callback at a time. All buffers are
/// allocated in [`Renderer::new`]; driver buffers larger than the
/// accumulator are mixed in accumulator-sized chunks.
pub struct Renderer {
    bus: Arc<MixBus>,
    commands: Consumer<MixCommand>,
    voices: Vec<Option<Voice>>,
    accumulator: Box<[f32]>,
    channel_count: usize,
    block_frames: usize,
    clip_output: bool,
}

impl Renderer {
    /// Create a renderer and the producer used to feed it commands.
    pub fn new(bus: Arc<MixBus>, spec: RenderSpec) -> (Producer<MixCommand>, Renderer) {
        let channel_count = spec.channel_count.clamp(1, 2) as usize;
        let block_frames = spec.frames_per_block.max(1);
        let (producer, consumer) = RingBuffer::new(spec.command_capacity.max(1));
        let voices = (0..bus.capacity()).map(|_| None).collect();

        let renderer = Renderer {
            bus,
            commands: consumer,
            voices,
            accumulator: vec![0.0; block_frames * channel_count].into_boxed_slice(),
            channel_count,
            block_frames,
            clip_output: spec.clip_output,
        };
        (producer, renderer)
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Install a voice directly, before the renderer is handed to a driver.
    pub fn attach(&mut self, slot: usize, source: SampleSource, counters: SlotCounters) {
        if let Some(entry) = self.voices.get_mut(slot) {
            *entry = Some(Voice {
                source,
                seen_trigger: counters.trigger_stamp,
                seen_stop: counters.stop_stamp,
                seen_reset: counters.reset_stamp,
            });
            self.bus.publish_state(slot, SourceState::Idle);
        }
    }

    /// Render interleaved frames into a driver buffer.
    ///
    /// `output.len()` should be a multiple of the channel count; a trailing
    /// partial frame is zeroed.
    pub fn render(&mut self, output: &mut [f32]) {
        self.begin_callback();

        let channels = self.channel_count;
        let chunk_len = self.block_frames * channels;
        let mut frames_total = 0u64;
        for chunk in output.chunks_mut(chunk_len) {
            let frames = chunk.len() / channels;
            let mixed = self.mix_block(frames);
            let len = mixed.len();
            chunk[..len].copy_from_slice(mixed);
            chunk[len..].fill(0.0);
            frames_total += frames as u64;
        }

        self.end_callback(frames_total);
    }

    /// Render into a stereo frame buffer (the layout Oboe hands to stereo
    /// callbacks). A mono renderer duplicates its channel.
    pub fn render_stereo(&mut self, output: &mut [(f32, f32)]) {
        self.begin_callback();

        let channels = self.channel_count;
        let block = self.block_frames;
        let mut frames_total = 0u64;
        for chunk in output.chunks_mut(block) {
            let mixed = self.mix_block(chunk.len());
            if channels == 2 {
                for (frame, pair) in chunk.iter_mut().zip(mixed.chunks_exact(2)) {
                    *frame = (pair[0], pair[1]);
                }
            } else {
                for (frame, &sample) in chunk.iter_mut().zip(mixed) {
                    *frame = (sample, sample);
                }
            }
            frames_total += chunk.len() as u64;
        }

        self.end_callback(frames_total);
    }

    /// Apply queued commands and pending control requests.
    fn begin_callback(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                MixCommand::Attach {
                    slot,
                    source,
                    counters,
                } => self.attach(slot, source, counters),
                MixCommand::DetachAll { generation } => {
                    for (slot, voice) in self.voices.iter_mut().enumerate() {
                        if voice.take().is_some() {
                            self.bus.publish_state(slot, SourceState::Idle);
                        }
                    }
                    self.bus.detach_ack.store(generation, Ordering::Release);
                }
            }
        }

        let reset = self.bus.reset_stamp.load(Ordering::Acquire);

        for (slot, entry) in self.voices.iter_mut().enumerate() {
            let Some(voice) = entry else { continue };
            let control = &self.bus.slots[slot];

            // Newest pending stop, whether per slot or bus wide.
            let mut stop_request = 0;
            let stop = control.stop_stamp.load(Ordering::Acquire);
            if stop > voice.seen_stop {
                voice.seen_stop = stop;
                stop_request = stop;
            }
            if reset > voice.seen_reset {
                voice.seen_reset = reset;
                stop_request = stop_request.max(reset);
            }

            let trigger = control.trigger_stamp.load(Ordering::Acquire);
            let trigger_pending = trigger > voice.seen_trigger;
            if trigger_pending {
                voice.seen_trigger = trigger;
            }

            // A stop only cancels triggers stamped before it.
            if trigger_pending && trigger > stop_request {
                voice.source.trigger();
            } else if stop_request > voice.seen_trigger {
                voice.source.stop();
            }

            let gain = control.gain.load();
            if gain != voice.source.gain() {
                voice.source.set_gain(gain);
            }
        }
    }

    /// Mix up to one accumulator of frames and return the scaled result.
    fn mix_block(&mut self, frames: usize) -> &[f32] {
        let frames = frames.min(self.block_frames);
        let channels = self.channel_count;
        let acc = &mut self.accumulator[..frames * channels];
        acc.fill(0.0);

        for voice in self.voices.iter_mut().flatten() {
            voice.source.render_next_block(acc, frames, channels);
        }

        let master = self.bus.master_gain.load();
        if self.clip_output {
            for sample in acc.iter_mut() {
                *sample = (*sample * master).clamp(-1.0, 1.0);
            }
        } else {
            for sample in acc.iter_mut() {
                *sample *= master;
            }
        }

        &self.accumulator[..frames * channels]
    }

    fn end_callback(&mut self, frames: u64) {
        for (slot, voice) in self.voices.iter().enumerate() {
            if let Some(voice) = voice {
                self.bus.publish_state(slot, voice.source.state());
            }
        }
        self.bus.frames_rendered.fetch_add(frames, Ordering::Relaxed);
    }
}
