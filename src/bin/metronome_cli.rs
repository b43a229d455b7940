use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand};
use metronome_player::engine::{AudioBackend, GainTarget, MetronomePlayer, OfflineBackend};
use metronome_player::metronome::{
    click_sample_buffer, is_on_beat, samples_per_beat, JsonRhythmStore, MetronomeController,
    RhythmModel, RhythmStore,
};
use metronome_player::wav::{AudioFormat, WavReader};
use metronome_player::{init_logging, AppConfig, SampleSource};
use serde::Serialize;

/// Slot the click lands in on a freshly created player.
const CLICK_SLOT: usize = 0;

#[derive(Parser, Debug)]
#[command(
    name = "metronome_cli",
    about = "Desktop harness for the metronome playback engine"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/metronome_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Saved rhythm used when --bpm or --divisions are omitted
    #[arg(long, global = true)]
    rhythm: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the format of a WAV file as JSON
    Inspect {
        #[arg(long)]
        wav: PathBuf,
    },
    /// Render a click track offline to a 32-bit float WAV file
    Render {
        /// Click sample; a synthesized click is used when omitted
        #[arg(long)]
        wav: Option<PathBuf>,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        bpm: Option<u32>,
        /// Beat grouping, e.g. 4,2,3
        #[arg(long, value_delimiter = ',')]
        divisions: Option<Vec<i32>>,
        #[arg(long, default_value_t = 8)]
        beats: u64,
        #[arg(long, default_value_t = 2)]
        channels: u16,
        #[arg(long)]
        sample_rate: Option<u32>,
    },
    /// Play a click track on the default output device
    Play {
        #[arg(long)]
        wav: Option<PathBuf>,
        #[arg(long)]
        bpm: Option<u32>,
        #[arg(long, value_delimiter = ',')]
        divisions: Option<Vec<i32>>,
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        #[arg(long, default_value_t = 2)]
        channels: u16,
    },
    /// Edit the saved rhythm (requires --rhythm) and print it as JSON
    Rhythm {
        /// New tempo, clamped to 30..=350
        #[arg(long)]
        bpm: Option<u32>,
        /// Group to edit, counted from 0
        #[arg(long, requires = "beats")]
        group: Option<usize>,
        /// Beats for --group, clamped to 0..=16
        #[arg(long, requires = "group")]
        beats: Option<i32>,
    },
}

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = AppConfig::load_from_file(
        cli.config
            .unwrap_or_else(|| PathBuf::from("assets/metronome_config.json")),
    );

    let store = cli.rhythm.map(JsonRhythmStore::new);

    match cli.command {
        Commands::Inspect { wav } => run_inspect(&wav),
        Commands::Render {
            wav,
            output,
            bpm,
            divisions,
            beats,
            channels,
            sample_rate,
        } => {
            let mut config = config;
            if let Some(rate) = sample_rate {
                config.engine.sample_rate = rate;
            }
            let rhythm = resolve_rhythm(&config, store.as_ref(), bpm, divisions)?;
            run_render(&config, wav.as_deref(), &output, &rhythm, beats, channels)
        }
        Commands::Play {
            wav,
            bpm,
            divisions,
            seconds,
            channels,
        } => {
            let rhythm = resolve_rhythm(&config, store.as_ref(), bpm, divisions)?;
            run_play(&config, wav.as_deref(), &rhythm, seconds, channels)
        }
        Commands::Rhythm { bpm, group, beats } => {
            let store = store.context("--rhythm <PATH> is required to edit a rhythm")?;
            run_rhythm(&store, bpm, group.zip(beats))
        }
    }
}

/// Command-line values win over the saved rhythm, which wins over the
/// configured default tempo.
fn resolve_rhythm(
    config: &AppConfig,
    store: Option<&JsonRhythmStore>,
    bpm: Option<u32>,
    divisions: Option<Vec<i32>>,
) -> Result<RhythmModel> {
    let base = match store {
        Some(store) => store.load_or_default(),
        None => RhythmModel {
            bpm: config.metronome.default_bpm,
            ..RhythmModel::default()
        },
    };
    let rhythm = RhythmModel::new(
        bpm.unwrap_or(base.bpm),
        divisions.unwrap_or(base.divisions),
    )?;
    Ok(rhythm)
}

fn run_rhythm(
    store: &JsonRhythmStore,
    bpm: Option<u32>,
    edit: Option<(usize, i32)>,
) -> Result<ExitCode> {
    let mut rhythm = store.load()?;
    if let Some(bpm) = bpm {
        rhythm.set_tempo(bpm);
    }
    if let Some((group, beats)) = edit {
        ensure!(
            rhythm.set_subdivisions(group, beats),
            "group {} does not exist in {:?}",
            group,
            rhythm.divisions
        );
    }
    if bpm.is_some() || edit.is_some() {
        store.save(&rhythm)?;
    }

    let report = RhythmReport {
        path: store.path().display().to_string(),
        emphasis: rhythm.emphasis_pattern(),
        rhythm,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::from(0))
}

fn run_inspect(path: &Path) -> Result<ExitCode> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let reader = WavReader::parse(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    let format = *reader.format();

    let report = InspectReport {
        path: path.display().to_string(),
        duration_secs: format.duration_secs(),
        format,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::from(0))
}

fn run_render(
    config: &AppConfig,
    wav: Option<&Path>,
    output: &Path,
    rhythm: &RhythmModel,
    beats: u64,
    channels: u16,
) -> Result<ExitCode> {
    let mut player = MetronomePlayer::with_backend(config.engine.clone(), OfflineBackend::new());
    ensure!(
        player.setup_audio_stream(channels),
        "failed to open offline stream with {} channel(s)",
        channels
    );
    ensure!(player.start_stream(), "failed to start offline stream");
    load_click(&mut player, config, wav)?;

    let control = player.control();
    let sample_rate = config.engine.sample_rate;
    let pattern = rhythm.emphasis_pattern();
    let spb = samples_per_beat(rhythm.bpm, sample_rate);
    let total_frames = spb * beats;
    let block = config.engine.frames_per_block.max(1) as u64;
    let ch = channels as usize;

    let mut rendered = Vec::with_capacity(total_frames as usize * ch);
    let mut scratch = vec![0.0f32; block as usize * ch];
    let mut frame = 0u64;
    let mut beat = 0usize;

    while frame < total_frames {
        if is_on_beat(frame, rhythm.bpm, sample_rate) {
            let accent = pattern[beat % pattern.len()];
            let gain = if accent {
                config.metronome.accent_gain
            } else {
                config.metronome.normal_gain
            };
            control.set_gain(GainTarget::Master, gain)?;
            control.trigger_down(CLICK_SLOT)?;
            beat += 1;
        }

        let next_beat = (frame / spb + 1) * spb;
        let frames = (next_beat - frame).min(block).min(total_frames - frame) as usize;
        let chunk = &mut scratch[..frames * ch];
        player.backend_mut().render(chunk);
        rendered.extend_from_slice(chunk);
        frame += frames as u64;
    }

    write_float_wav(output, &rendered, channels, sample_rate)?;

    let peak = rendered.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    let report = RenderReport {
        output: output.display().to_string(),
        frames: total_frames,
        beats: beat,
        peak,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::from(0))
}

fn run_play(
    config: &AppConfig,
    wav: Option<&Path>,
    rhythm: &RhythmModel,
    seconds: u64,
    channels: u16,
) -> Result<ExitCode> {
    let mut player = MetronomePlayer::new(config.engine.clone());
    ensure!(
        player.setup_audio_stream(channels),
        "failed to open output stream"
    );
    ensure!(player.start_stream(), "failed to start output stream");
    load_click(&mut player, config, wav)?;

    let metronome = metronome_player::MetronomeConfig {
        click_slot: CLICK_SLOT,
        ..config.metronome.clone()
    };
    let mut controller = MetronomeController::new(player.control(), &metronome, rhythm.clone())?;
    controller.play();

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        thread::sleep(Duration::from_millis(100));
        if player.get_output_reset() {
            tracing::warn!("Output device lost; restarting stream");
            if player.restart_stream() {
                player.clear_output_reset();
            }
        }
        player.collect_garbage();
    }

    controller.stop();
    player.teardown_audio_stream();
    Ok(ExitCode::from(0))
}

/// Register the click sample: the given WAV file, or the synthesized click.
fn load_click<B: AudioBackend>(
    player: &mut MetronomePlayer<B>,
    config: &AppConfig,
    wav: Option<&Path>,
) -> Result<()> {
    match wav {
        Some(path) => {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            if !player.load_wav_asset(&bytes, 1) {
                if player.source_count() == 0 {
                    bail!("could not decode {}", path.display());
                }
                tracing::warn!("{} is not mono; playing it anyway", path.display());
            }
        }
        None => {
            let buffer = click_sample_buffer(config.engine.sample_rate)?;
            let source =
                SampleSource::one_shot(Arc::new(buffer), 0.0).with_pan_law(config.engine.pan_law);
            player.add_sample_source(source)?;
        }
    }
    Ok(())
}

fn write_float_wav(path: &Path, samples: &[f32], channels: u16, sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[derive(Serialize)]
struct InspectReport {
    path: String,
    duration_secs: f64,
    format: AudioFormat,
}

#[derive(Serialize)]
struct RhythmReport {
    path: String,
    rhythm: RhythmModel,
    emphasis: Vec<bool>,
}

#[derive(Serialize)]
struct RenderReport {
    output: String,
    frames: u64,
    beats: usize,
    peak: f32,
}
