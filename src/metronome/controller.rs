//! MetronomeController - wall-clock beat scheduling
//!
//! A polling thread wakes every `poll_interval_ms`, and once a full beat
//! period has elapsed since the last click it sets the master gain for the
//! beat's emphasis and triggers the click slot. Timing therefore has up to
//! one poll interval of jitter; sample-accurate scheduling is what the CLI's
//! offline renderer does instead.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::MetronomeConfig;
use crate::engine::{GainTarget, PlayerControl};
use crate::error::EngineError;

use super::rhythm::RhythmModel;

/// Monotonic clock used for beat scheduling.
pub trait TimeSource: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time source that only moves when told to.
pub struct ManualTimeSource {
    start: Instant,
    offset_ms: AtomicU64,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.offset_ms.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.start + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

impl<T: TimeSource> TimeSource for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Where clicks go.
pub trait ClickSink: Send + Sync + 'static {
    fn play_click(&self, slot: usize);
    fn set_click_gain(&self, gain: f32);
}

impl ClickSink for PlayerControl {
    fn play_click(&self, slot: usize) {
        if let Err(err) = self.trigger_down(slot) {
            tracing::warn!("Click trigger failed: {}", err);
        }
    }

    fn set_click_gain(&self, gain: f32) {
        if let Err(err) = self.set_gain(GainTarget::Master, gain) {
            tracing::warn!("Click gain update failed: {}", err);
        }
    }
}

struct Schedule {
    emphasis: Vec<bool>,
    position: usize,
    last_beat: Option<Instant>,
}

struct Shared<S, T> {
    sink: S,
    clock: T,
    bpm: AtomicU32,
    schedule: Mutex<Schedule>,
    click_slot: usize,
    accent_gain: f32,
    normal_gain: f32,
}

impl<S: ClickSink, T: TimeSource> Shared<S, T> {
    fn tick(&self) -> Option<bool> {
        let now = self.clock.now();
        let bpm = self.bpm.load(Ordering::Relaxed).max(1);
        let period = Duration::from_secs_f64(60.0 / f64::from(bpm));

        let mut schedule = match self.schedule.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let due = match schedule.last_beat {
            None => true,
            Some(last) => now >= last + period,
        };
        if !due {
            return None;
        }

        if schedule.position >= schedule.emphasis.len() {
            schedule.position = 0;
        }
        let accent = schedule.emphasis.get(schedule.position).copied().unwrap_or(true);
        schedule.position += 1;
        schedule.last_beat = Some(now);
        drop(schedule);

        self.sink.set_click_gain(if accent {
            self.accent_gain
        } else {
            self.normal_gain
        });
        self.sink.play_click(self.click_slot);
        Some(accent)
    }
}

/// Drives a [`ClickSink`] from a polling thread.
pub struct MetronomeController<S: ClickSink, T: TimeSource = SystemTimeSource> {
    shared: Arc<Shared<S, T>>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<S: ClickSink> MetronomeController<S, SystemTimeSource> {
    pub fn new(
        sink: S,
        config: &MetronomeConfig,
        rhythm: RhythmModel,
    ) -> Result<Self, EngineError> {
        Self::with_clock(sink, SystemTimeSource::default(), config, rhythm)
    }
}

impl<S: ClickSink, T: TimeSource> MetronomeController<S, T> {
    pub fn with_clock(
        sink: S,
        clock: T,
        config: &MetronomeConfig,
        rhythm: RhythmModel,
    ) -> Result<Self, EngineError> {
        rhythm.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                sink,
                clock,
                bpm: AtomicU32::new(rhythm.bpm),
                schedule: Mutex::new(Schedule {
                    emphasis: rhythm.emphasis_pattern(),
                    position: 0,
                    last_beat: None,
                }),
                click_slot: config.click_slot,
                accent_gain: config.accent_gain,
                normal_gain: config.normal_gain,
            }),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    pub fn bpm(&self) -> u32 {
        self.shared.bpm.load(Ordering::Relaxed)
    }

    /// Apply a new tempo and grouping. Takes effect on the next poll.
    pub fn set_rhythm(&self, rhythm: &RhythmModel) -> Result<(), EngineError> {
        rhythm.validate()?;
        self.shared.bpm.store(rhythm.bpm, Ordering::Relaxed);

        let mut schedule = match self.shared.schedule.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        schedule.emphasis = rhythm.emphasis_pattern();
        tracing::info!(
            "Rhythm set to {} BPM, {} beat(s) per cycle",
            rhythm.bpm,
            schedule.emphasis.len()
        );
        Ok(())
    }

    /// Run one scheduling step. Returns `Some(accented)` if a click fired.
    pub fn tick(&self) -> Option<bool> {
        self.shared.tick()
    }

    pub fn is_playing(&self) -> bool {
        self.worker.is_some()
    }

    /// Start the polling thread. No-op if already playing.
    pub fn play(&mut self) {
        if self.worker.is_some() {
            return;
        }

        {
            let mut schedule = match self.shared.schedule.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            schedule.position = 0;
            schedule.last_beat = None;
        }

        self.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;

        self.worker = Some(thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                shared.tick();
                thread::sleep(poll_interval);
            }
        }));
        tracing::info!("Metronome started at {} BPM", self.bpm());
    }

    /// Stop the polling thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Metronome thread panicked");
            }
            tracing::info!("Metronome stopped");
        }
    }
}

impl<S: ClickSink, T: TimeSource> Drop for MetronomeController<S, T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Gain(f32),
        Click(usize),
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ClickSink for Arc<RecordingSink> {
        fn play_click(&self, slot: usize) {
            self.events.lock().unwrap().push(Event::Click(slot));
        }

        fn set_click_gain(&self, gain: f32) {
            self.events.lock().unwrap().push(Event::Gain(gain));
        }
    }

    fn controller(
        divisions: Vec<i32>,
        bpm: u32,
    ) -> (
        MetronomeController<Arc<RecordingSink>, Arc<ManualTimeSource>>,
        Arc<RecordingSink>,
        Arc<ManualTimeSource>,
    ) {
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(ManualTimeSource::new());
        let controller = MetronomeController::with_clock(
            Arc::clone(&sink),
            Arc::clone(&clock),
            &MetronomeConfig::default(),
            RhythmModel { bpm, divisions },
        )
        .unwrap();
        (controller, sink, clock)
    }

    #[test]
    fn test_first_tick_clicks_immediately() {
        let (controller, sink, _clock) = controller(vec![1, 0], 120);
        assert_eq!(controller.tick(), Some(true));
        assert_eq!(sink.events(), vec![Event::Gain(1.8), Event::Click(0)]);
    }

    #[test]
    fn test_waits_for_beat_period() {
        let (controller, _sink, clock) = controller(vec![1], 120);
        assert!(controller.tick().is_some());

        clock.advance(480);
        assert_eq!(controller.tick(), None);

        clock.advance(20);
        assert!(controller.tick().is_some());
    }

    #[test]
    fn test_accents_follow_grouping() {
        let (controller, _sink, clock) = controller(vec![3, 2], 60);
        let mut accents = Vec::new();
        for _ in 0..7 {
            accents.push(controller.tick().unwrap());
            clock.advance(1000);
        }
        assert_eq!(accents, vec![true, false, false, true, false, true, false]);
    }

    #[test]
    fn test_gain_is_set_before_click() {
        let (controller, sink, clock) = controller(vec![2], 60);
        controller.tick();
        clock.advance(1000);
        controller.tick();

        assert_eq!(
            sink.events(),
            vec![
                Event::Gain(1.8),
                Event::Click(0),
                Event::Gain(0.4),
                Event::Click(0)
            ]
        );
    }

    #[test]
    fn test_set_rhythm_applies_live() {
        let (controller, _sink, clock) = controller(vec![1], 60);
        controller.tick();

        controller.set_rhythm(&RhythmModel::new(120, vec![2]).unwrap()).unwrap();
        assert_eq!(controller.bpm(), 120);

        clock.advance(500);
        assert!(controller.tick().is_some());
        assert!(matches!(
            controller.set_rhythm(&RhythmModel {
                bpm: 0,
                divisions: vec![1]
            }),
            Err(EngineError::BpmInvalid { bpm: 0 })
        ));
    }

    #[test]
    fn test_player_sink_survives_out_of_range_slot() {
        use crate::config::EngineConfig;
        use crate::engine::{MetronomePlayer, OfflineBackend};

        let player = MetronomePlayer::with_backend(
            EngineConfig {
                max_sources: 2,
                ..EngineConfig::default()
            },
            OfflineBackend::new(),
        );
        let control = player.control();
        let config = MetronomeConfig {
            click_slot: 7,
            ..MetronomeConfig::default()
        };
        let controller = MetronomeController::with_clock(
            control.clone(),
            Arc::new(ManualTimeSource::new()),
            &config,
            RhythmModel::new(120, vec![2]).unwrap(),
        )
        .unwrap();

        // The failed trigger is logged; the accent gain still lands.
        assert_eq!(controller.tick(), Some(true));
        assert_eq!(control.master_gain(), 1.8);
    }

    #[test]
    fn test_play_is_idempotent_and_stop_joins() {
        let sink = Arc::new(RecordingSink::default());
        let config = MetronomeConfig {
            poll_interval_ms: 1,
            ..MetronomeConfig::default()
        };
        let mut controller =
            MetronomeController::new(Arc::clone(&sink), &config, RhythmModel::default()).unwrap();

        controller.play();
        controller.play();
        assert!(controller.is_playing());

        let deadline = Instant::now() + Duration::from_secs(2);
        while sink.events().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        controller.stop();
        assert!(!controller.is_playing());

        let events = sink.events();
        assert_eq!(events.first(), Some(&Event::Gain(1.8)));
        let count = events.len();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sink.events().len(), count, "no clicks after stop");
    }
}
