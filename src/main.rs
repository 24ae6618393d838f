//! emuterm - play emulators in a terminal
//!
//! Runs an emulation engine in real time and draws it with half-block
//! characters, two pixels per cell, with paced audio. Works in local
//! terminals and over SSH.
//!
//! # Quick Start
//!
//! ```text
//! emuterm                       # Built-in demo engine, detected colors
//! emuterm -c 3                  # Force 256 colors
//! emuterm -f 2 -s 1.5           # Render every other frame, 1.5x speed
//! emuterm -i run.txt -b 3600    # Replay an input log for one minute
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl+C | Quit |
//! | Ctrl+D | Quit |

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use emuterm::audio::{AudioOutput, AudioSink, NoAudio};
use emuterm::config::Config;
use emuterm::core::{Clock, Console, FrameScheduler, SessionOutcome, SystemClock};
use emuterm::demo::DemoConsole;
use emuterm::input::{
    open_input_log, InputGetter, NoInput, RecordingInput, ReplayInput, DEFAULT_SKIP_LINES,
};
use emuterm::ui::{detect_color_mode, ColorMode, LocalTerminal};
use emuterm::Error;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "emuterm - play emulators in the terminal")]
struct Args {
    /// Color mode: 1 greyscale, 2 16 colors, 3 256 colors, 4 true color
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=4))]
    color_mode: Option<u8>,

    /// Render every Nth frame
    #[arg(short = 'f', long)]
    frame_advance: Option<u32>,

    /// Stop after this many frames
    #[arg(short = 'b', long)]
    break_after: Option<u64>,

    /// Emulation speed multiplier
    #[arg(short = 's', long)]
    speed_factor: Option<f64>,

    /// Run without sound
    #[arg(short = 'd', long)]
    disable_audio: bool,

    /// Replay inputs from a BizHawk-style log
    #[arg(short = 'i', long)]
    input_file: Option<PathBuf>,

    /// Log lines skipped at the start of the input log
    #[arg(long, default_value_t = DEFAULT_SKIP_LINES)]
    skip_inputs: usize,

    /// Record inputs to a log file
    #[arg(short = 'r', long)]
    record_input: Option<PathBuf>,

    /// Do not wait for the terminal to acknowledge each frame
    #[arg(long)]
    no_cpr_sync: bool,

    /// Log file (default: ~/.emuterm/emuterm.log)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Configuration file (default: ~/.emuterm/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    /// Command line values take precedence over the file
    fn apply(&self, config: &mut Config) {
        if let Some(n) = self.frame_advance {
            config.frame_advance = n;
        }
        if let Some(speed) = self.speed_factor {
            config.speed_factor = speed;
        }
        if let Some(level) = self.color_mode {
            config.color_mode = level.to_string();
        }
        if self.disable_audio {
            config.audio = false;
        }
        if self.no_cpr_sync {
            config.flow_control.enabled = false;
        }
        if let Some(path) = &self.log_file {
            config.logging.file = Some(path.clone());
        }
    }
}

fn init_logging(path: &Path, level: &str) {
    // Create log directory if needed
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    // Open log file (append mode)
    let log_file = OpenOptions::new().create(true).append(true).open(path).ok();

    if let Some(file) = log_file {
        let filter =
            EnvFilter::try_from_env("EMUTERM_LOG").unwrap_or_else(|_| EnvFilter::new(level));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn open_input(args: &Args) -> anyhow::Result<Box<dyn InputGetter>> {
    let mut input: Box<dyn InputGetter> = match &args.input_file {
        Some(path) => {
            let log = open_input_log(path)
                .with_context(|| format!("Cannot open input log {}", path.display()))?;
            info!("Replaying inputs from {}", path.display());
            Box::new(ReplayInput::new(log, args.skip_inputs))
        }
        None => Box::new(NoInput),
    };

    if let Some(path) = &args.record_input {
        let file = File::create(path)
            .with_context(|| format!("Cannot create input log {}", path.display()))?;
        info!("Recording inputs to {}", path.display());
        let inner = move || input.get_input();
        input = Box::new(RecordingInput::new(inner, BufWriter::new(file)));
    }
    Ok(input)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (mut config, config_problem) = match &args.config {
        Some(path) => {
            let config = Config::load_from(path)
                .with_context(|| format!("Cannot load {}", path.display()))?;
            (config, None)
        }
        None => Config::load(),
    };
    args.apply(&mut config);

    init_logging(&config.log_path(), &config.logging.level);
    info!("emuterm {} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_problem {
        warn!("Ignoring configuration file: {}", e);
    }

    let color_mode = match config.color_mode()? {
        Some(mode) => mode,
        None => {
            let env: HashMap<String, String> = std::env::vars().collect();
            detect_color_mode(&env)
        }
    };
    if color_mode == ColorMode::NoColor {
        return Err(Error::NoColor.into());
    }
    info!("Color mode: {}", color_mode.name());

    let mut options = config.scheduler_options(color_mode)?;
    options.break_after = args.break_after;

    let console = DemoConsole::new();
    let geometry = console.geometry();

    // Audio is optional: any device problem means silence
    let (_output, audio): (Option<AudioOutput>, Box<dyn AudioSink>) = if config.audio {
        match AudioOutput::open(geometry.sample_rate(), options.speed_factor) {
            Ok((output, pacer)) => {
                info!("Audio output at {} Hz", output.sample_rate());
                (Some(output), Box::new(pacer) as Box<dyn AudioSink>)
            }
            Err(e) => {
                warn!("Audio disabled: {}", e);
                (None, Box::new(NoAudio) as Box<dyn AudioSink>)
            }
        }
    } else {
        info!("Audio disabled");
        (None, Box::new(NoAudio) as Box<dyn AudioSink>)
    };

    let input = open_input(&args)?;
    let terminal = LocalTerminal::open().context("Cannot set up the terminal")?;

    let clock = SystemClock;
    let started = clock.now();
    let mut scheduler = FrameScheduler::new(console, terminal, input, audio, clock, options)?;
    let result = scheduler.run();

    // anyhow prints the error after main returns; leave raw mode first
    let _ = scheduler.terminal_mut().restore();
    drop(scheduler);

    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok(SessionOutcome::FrameLimit) => {
            info!("Frame limit reached after {:.1}s", elapsed);
        }
        Ok(SessionOutcome::Cancelled(reason)) => {
            info!("Stopped by user ({:?}) after {:.1}s", reason, elapsed);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
