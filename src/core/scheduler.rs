//! Frame scheduler
//!
//! Drives the engine one frame per tick at its native rate times the speed
//! factor. Each tick:
//!
//! 1. sample input and advance the engine
//! 2. hand the produced audio to the sink
//! 3. drain terminal events (interrupt, end of input, acknowledgements)
//! 4. render when the frame is due, repainted, acknowledged and on time
//! 5. sleep until the deadline
//! 6. push the status title about once per second
//!
//! ```text
//! FrameScheduler
//! ├── Console         (engine: pixels + samples)
//! ├── InputGetter     (one snapshot per tick)
//! ├── AudioSink       (pacer or NoAudio)
//! ├── FrameEncoder    (diff against last_rendered)
//! ├── TerminalSession (writes, acks, events)
//! └── PacingState     (deadline, screen_ready)
//! ```

use std::io;
use std::mem;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::console::{Console, Geometry, PixelGrid};
use super::pacing::{Clock, FrameStats, PacingState, SystemClock, TickSample};
use super::session::{SessionEvent, TerminalSession};
use crate::audio::AudioSink;
use crate::error::{is_disconnect, Error, Result};
use crate::input::InputGetter;
use crate::ui::blit::{FrameEncoder, Viewport};
use crate::ui::color::ColorMode;

/// Name shown first in the status title
const APP_NAME: &str = "emuterm";

/// Accepted range of the speed multiplier
const SPEED_RANGE: (f64, f64) = (1e-3, 1e3);

/// Runtime knobs of the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    /// Render at most every Nth tick
    pub frame_advance: u32,
    /// Emulation speed multiplier
    pub speed_factor: f64,
    /// Stop cleanly after this many ticks
    pub break_after: Option<u64>,
    pub color_mode: ColorMode,
    /// Use position reports as frame acknowledgements
    pub cpr_sync: bool,
    /// Longest wait for an acknowledgement before rendering anyway
    pub ack_timeout: Duration,
    /// Remaining waits shorter than this are not slept
    pub sleep_epsilon: Duration,
    /// Lag beyond which the deadline jumps to the present
    pub resync_after: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            frame_advance: 1,
            speed_factor: 1.0,
            break_after: None,
            color_mode: ColorMode::TrueColor,
            cpr_sync: true,
            ack_timeout: Duration::from_millis(500),
            sleep_epsilon: Duration::from_millis(1),
            resync_after: Duration::from_secs(1),
        }
    }
}

impl SchedulerOptions {
    pub fn validate(&self) -> Result<()> {
        if self.frame_advance == 0 {
            return Err(Error::Config("frame_advance must be at least 1".into()));
        }
        let (min_speed, max_speed) = SPEED_RANGE;
        if !(min_speed..=max_speed).contains(&self.speed_factor) {
            return Err(Error::Config(format!(
                "speed_factor must be between {} and {}, got {}",
                min_speed, max_speed, self.speed_factor
            )));
        }
        if self.color_mode == ColorMode::NoColor {
            return Err(Error::NoColor);
        }
        Ok(())
    }
}

/// Why a session was cancelled by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Ctrl+C
    Interrupt,
    /// Ctrl+D or closed input
    EndOfInput,
}

/// Result of one tick
#[derive(Debug)]
pub enum TickOutcome {
    Continue,
    Cancelled(CancelReason),
    Failed(Error),
}

/// How a session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// `break_after` ticks were run
    FrameLimit,
    Cancelled(CancelReason),
}

/// Single-threaded emulation and render loop for one terminal
pub struct FrameScheduler<C, T, K = SystemClock> {
    console: C,
    terminal: T,
    input: Box<dyn InputGetter>,
    audio: Box<dyn AudioSink>,
    clock: K,
    options: SchedulerOptions,
    geometry: Geometry,
    encoder: FrameEncoder,
    /// Engine output of the latest tick
    current: PixelGrid,
    /// Exactly what the terminal shows, when `last_rendered_valid`
    last_rendered: PixelGrid,
    last_rendered_valid: bool,
    audio_buffer: Vec<[i16; 2]>,
    events: Vec<SessionEvent>,
    pending_repaint: bool,
    /// Terminal size the viewport was computed for
    term_size: Option<(u16, u16)>,
    viewport: Viewport,
    pacing: PacingState,
    stats: FrameStats,
    report_every: u64,
    last_tick_at: Option<Instant>,
    ack_timeouts: u64,
}

impl<C, T, K> FrameScheduler<C, T, K>
where
    C: Console,
    T: TerminalSession,
    K: Clock,
{
    /// Set up a session. Refuses invalid options and `NoColor`.
    pub fn new(
        console: C,
        terminal: T,
        input: Box<dyn InputGetter>,
        mut audio: Box<dyn AudioSink>,
        clock: K,
        options: SchedulerOptions,
    ) -> Result<Self> {
        options.validate()?;

        let geometry = console.geometry();
        let fps = geometry.fps * options.speed_factor;
        let frame_period = Duration::try_from_secs_f64(1.0 / fps)
            .map_err(|_| Error::Config(format!("unusable frame rate {} FPS", fps)))?;
        let window = (geometry.fps.round() as usize).max(1);
        let pacing = PacingState::new(
            clock.now(),
            frame_period,
            options.sleep_epsilon,
            options.resync_after,
            window,
        );
        audio.set_speed(options.speed_factor);

        Ok(Self {
            console,
            terminal,
            input,
            audio,
            clock,
            geometry,
            encoder: FrameEncoder::new(),
            current: PixelGrid::new(geometry.width, geometry.height),
            last_rendered: PixelGrid::new(geometry.width, geometry.height),
            last_rendered_valid: false,
            audio_buffer: vec![[0; 2]; 2 * geometry.ticks_in_frame],
            events: Vec::new(),
            pending_repaint: false,
            term_size: None,
            viewport: Viewport::default(),
            pacing,
            stats: FrameStats::new(window),
            report_every: window as u64,
            last_tick_at: None,
            ack_timeouts: 0,
            options,
        })
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut T {
        &mut self.terminal
    }

    pub fn pacing(&self) -> &PacingState {
        &self.pacing
    }

    /// Load the game and anchor the pacing deadline to now
    pub fn start(&mut self) -> Result<()> {
        self.console
            .load()
            .map_err(|code| Error::EmulatorLoad { code })?;

        info!(
            "Starting {} ({}x{} @ {:.2} FPS, {}, speed x{})",
            self.console.name(),
            self.geometry.width,
            self.geometry.height,
            self.geometry.fps,
            self.options.color_mode.name(),
            self.options.speed_factor
        );

        self.terminal.clear_screen().map_err(Error::from_terminal)?;
        self.pacing = PacingState::new(
            self.clock.now(),
            self.pacing.frame_period(),
            self.options.sleep_epsilon,
            self.options.resync_after,
            self.report_every as usize,
        );
        Ok(())
    }

    /// Run until cancelled, the frame limit is hit, or the terminal is lost
    pub fn run(&mut self) -> Result<SessionOutcome> {
        self.start()?;

        let mut i = 0u64;
        loop {
            if let Some(limit) = self.options.break_after {
                if i >= limit {
                    info!("Stopping after {} frames", i);
                    return Ok(SessionOutcome::FrameLimit);
                }
            }
            match self.tick(i) {
                TickOutcome::Continue => {}
                TickOutcome::Cancelled(reason) => {
                    info!("Session cancelled ({:?}) after {} frames", reason, i);
                    return Ok(SessionOutcome::Cancelled(reason));
                }
                TickOutcome::Failed(e) => {
                    error!("Session failed after {} frames: {}", i, e);
                    return Err(e);
                }
            }
            i += 1;
        }
    }

    /// Run tick `i`
    pub fn tick(&mut self, i: u64) -> TickOutcome {
        let tick_start = self.clock.now();
        let interval = match self.last_tick_at {
            Some(last) => (tick_start - last).as_secs_f64(),
            None => self.pacing.frame_period().as_secs_f64(),
        };
        self.last_tick_at = Some(tick_start);

        // Input and advance
        let input = self.input.get_input();
        self.console.set_input(input);
        let advance = self
            .console
            .advance_one_frame(&mut self.current, &mut self.audio_buffer);
        self.pending_repaint |= advance.repainted();
        let samples = advance.samples.min(self.audio_buffer.len());
        let emulated_at = self.clock.now();

        // Audio
        self.audio.send(&self.audio_buffer[..samples]);
        let audio_done_at = self.clock.now();

        // Terminal events
        if let Some(reason) = self.handle_events() {
            return TickOutcome::Cancelled(reason);
        }
        if self.options.cpr_sync
            && self
                .pacing
                .expire_ack(audio_done_at, self.options.ack_timeout)
        {
            self.ack_timeouts += 1;
            if self.ack_timeouts == 1 {
                warn!(
                    "No acknowledgement within {:?}, rendering anyway",
                    self.options.ack_timeout
                );
            } else {
                debug!("Acknowledgement timeout #{}", self.ack_timeouts);
            }
        }

        // Render
        let mut bytes = 0;
        let mut rendered = false;
        if self.should_render(i) {
            self.pending_repaint = false;
            match self.render() {
                Ok(n) => {
                    bytes = n;
                    rendered = true;
                }
                Err(e) if is_disconnect(&e) => {
                    return TickOutcome::Failed(Error::Disconnected(e));
                }
                Err(e) => {
                    warn!("Frame {} skipped: {}", i, e);
                    self.last_rendered_valid = false;
                }
            }
        }
        let video_done_at = self.clock.now();

        // Timing
        let increment = samples as f64 / self.geometry.ticks_in_frame as f64;
        self.pacing.wait_for_deadline(&mut self.clock, increment);

        // Reporting
        self.stats.record(TickSample {
            interval,
            emulation: (emulated_at - tick_start).as_secs_f64(),
            video: (video_done_at - audio_done_at).as_secs_f64(),
            audio: (audio_done_at - emulated_at).as_secs_f64(),
            bytes,
            rendered,
        });
        if (i + 1) % self.report_every == 0 {
            if let Err(e) = self.report() {
                if is_disconnect(&e) {
                    return TickOutcome::Failed(Error::Disconnected(e));
                }
                debug!("Failed to set title: {}", e);
            }
        }

        TickOutcome::Continue
    }

    fn should_render(&self, i: u64) -> bool {
        i % self.options.frame_advance as u64 == 0
            && self.pending_repaint
            && self.pacing.screen_ready()
            && !self.pacing.shifting_behind()
    }

    fn handle_events(&mut self) -> Option<CancelReason> {
        let mut events = mem::take(&mut self.events);
        self.terminal.poll_events(&mut events);

        let mut cancel = None;
        for event in events.drain(..) {
            match event {
                SessionEvent::Interrupt => {
                    cancel = Some(CancelReason::Interrupt);
                    break;
                }
                SessionEvent::EndOfInput => {
                    cancel = Some(CancelReason::EndOfInput);
                    break;
                }
                SessionEvent::Resize { rows, cols } => {
                    debug!("Resize notification: {}x{}", cols, rows);
                }
                SessionEvent::Ack { .. } => self.pacing.ack_received(),
            }
        }
        self.events = events;
        cancel
    }

    /// Encode and write the current frame. Returns the bytes written.
    fn render(&mut self) -> io::Result<usize> {
        let size = self.terminal.size()?;
        if self.term_size != Some(size) {
            if self.term_size.is_some() {
                info!("Terminal resized to {}x{}", size.1, size.0);
            }
            self.last_rendered_valid = false;
            self.viewport = Viewport::centered(size.0, size.1, &self.geometry);
            self.terminal.clear_screen()?;
            self.term_size = Some(size);
        }

        let previous = self.last_rendered_valid.then_some(&self.last_rendered);
        let frame = self
            .encoder
            .encode(&self.current, previous, self.viewport, self.options.color_mode);
        let len = frame.len();
        if len == 0 {
            return Ok(0);
        }

        self.last_rendered_valid = false;
        self.terminal.write(frame)?;
        self.last_rendered.copy_from(&self.current);
        self.last_rendered_valid = true;

        if self.options.cpr_sync {
            self.terminal.ask_for_ack()?;
            self.pacing.frame_sent(self.clock.now());
        }
        Ok(len)
    }

    fn report(&mut self) -> io::Result<()> {
        let report = self.stats.report();
        let shift = self.pacing.shifts().mean() * 1000.0;
        debug!(
            "emu {:.1} FPS {:.0}% | video {:.1} FPS {:.0}% {:.0} KB/s | \
             audio {:.0}% ({} queued) | shift {:.2}ms",
            report.emu_fps,
            report.emu_cpu,
            report.video_fps,
            report.video_cpu,
            report.video_kbps,
            report.audio_cpu,
            self.audio.queued_blocks(),
            shift
        );
        self.terminal
            .set_title(&report.title(APP_NAME, self.console.name()))
    }
}
