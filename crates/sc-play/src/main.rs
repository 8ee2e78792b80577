//! sc-play - headless soundcard driver
//!
//! Loads a soundcard configuration, opens the selected device and runs the
//! play loop for a fixed time while rendering a test tone into the app
//! buffers.

mod tone;

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, ValueEnum};

use sc_audio::{SoundcardEngine, StepOutcome, TransportEvent};
use sc_core::{BackendKind, EngineConfig};

use tone::SineTone;

#[derive(Parser, Debug)]
#[command(name = "sc-play")]
#[command(about = "Play a test tone through the soundcard engine")]
struct Cli {
    /// Soundcard configuration (YAML, or JSON by extension)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override the configured backend
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Output device, e.g. `cpal-out-0`
    #[arg(long, short)]
    device: Option<String>,

    /// Override the configured tempo
    #[arg(long)]
    bpm: Option<f64>,

    /// Playback duration
    #[arg(long, default_value_t = 5.0)]
    seconds: f64,

    /// Test tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    frequency: f64,

    /// List output devices and exit
    #[arg(long)]
    list: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Cpal,
    Alsa,
    Oss,
    CoreAudio,
    Wasapi,
    Null,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Cpal => Self::Cpal,
            BackendArg::Alsa => Self::Alsa,
            BackendArg::Oss => Self::Oss,
            BackendArg::CoreAudio => Self::CoreAudio,
            BackendArg::Wasapi => Self::Wasapi,
            BackendArg::Null => Self::Null,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }
    if let Some(device) = &cli.device {
        config.device = Some(device.clone());
    }
    if let Some(bpm) = cli.bpm {
        config.bpm = bpm;
    }

    // The null sink accepts buffers instantly; pace it like hardware
    let paced = config.backend == BackendKind::Null;

    let engine = SoundcardEngine::from_config(config).context("creating soundcard engine")?;

    if cli.list {
        for card in engine.list_cards()? {
            let marker = if card.is_default { "*" } else { " " };
            println!("{marker} {:<20} {}", card.id.to_string(), card.name);
        }
        return Ok(());
    }

    let events = engine.subscribe();
    engine.play_init().context("starting playback")?;

    let presets = engine.presets();
    let channels = presets.channels as usize;
    let buffer_period = Duration::from_secs_f64(presets.buffer_seconds());
    let mut tone = SineTone::new(cli.frequency, presets.samplerate, 0.25);

    log::info!(
        "Playing {:.1} Hz on {} for {:.1}s at {} bpm",
        cli.frequency,
        engine.device(),
        cli.seconds,
        engine.bpm()
    );

    let deadline = Instant::now() + Duration::from_secs_f64(cli.seconds.max(0.0));
    let mut steps = 0u64;

    while Instant::now() < deadline {
        {
            let pool = engine.buffers();
            if let Some(buffer) = pool.lock(pool.next()) {
                buffer.write(|bytes| tone.render(bytes, channels, presets.format));
            }
        }

        match engine.play_step().context("soundcard step")? {
            StepOutcome::Idle => break,
            StepOutcome::Written { timed_out, recovered } => {
                steps += 1;
                if recovered {
                    log::warn!("Recovered from underrun at step {}", steps);
                }
                if timed_out {
                    log::debug!("Device poll timed out at step {}", steps);
                }
            }
        }

        for event in events.try_iter() {
            if let TransportEvent::OffsetChanged { note_offset_absolute, .. } = event
                && note_offset_absolute % 16 == 0
            {
                log::info!("Bar {} ({})", note_offset_absolute / 16, engine.uptime());
            }
        }

        if paced {
            thread::sleep(buffer_period);
        }
    }

    engine.stop();
    engine.wait_tasks();

    log::info!("Played {} buffers", steps);
    Ok(())
}
