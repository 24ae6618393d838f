//! Frame pacing
//!
//! Deadline-based timing: every tick moves the deadline forward by the
//! logical duration of the frame it produced, and the loop sleeps until that
//! deadline. The deadline is re-anchored to itself, never to "now", so
//! scheduling jitter does not accumulate.
//!
//! Also holds the CPR flow-control flag and the rolling statistics shown in
//! the status title.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

/// Source of time for the scheduler
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&mut self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Fixed-size rolling window of recent values
#[derive(Debug, Clone)]
pub struct Window<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T> Window<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.values.iter()
    }
}

impl Window<f64> {
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f64>() / self.values.len() as f64
        }
    }
}

/// Signed `a - b` in seconds
fn signed_secs(a: Instant, b: Instant) -> f64 {
    if a >= b {
        (a - b).as_secs_f64()
    } else {
        -(b - a).as_secs_f64()
    }
}

/// Timing and flow-control state owned by the scheduler
#[derive(Debug)]
pub struct PacingState {
    deadline: Instant,
    /// Wall-clock length of one nominal frame, speed factor applied
    frame_period: f64,
    sleep_epsilon: Duration,
    resync_after: Duration,
    /// `now - deadline` after each tick, in seconds
    shifts: Window<f64>,
    shifting_behind: bool,
    screen_ready: bool,
    ack_sent_at: Option<Instant>,
}

impl PacingState {
    pub fn new(
        start: Instant,
        frame_period: Duration,
        sleep_epsilon: Duration,
        resync_after: Duration,
        window: usize,
    ) -> Self {
        Self {
            deadline: start,
            frame_period: frame_period.as_secs_f64(),
            sleep_epsilon,
            resync_after,
            shifts: Window::new(window),
            shifting_behind: false,
            screen_ready: true,
            ack_sent_at: None,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(self.frame_period)
    }

    /// True when the last tick finished more than one frame late
    pub fn shifting_behind(&self) -> bool {
        self.shifting_behind
    }

    pub fn shifts(&self) -> &Window<f64> {
        &self.shifts
    }

    /// Advance the deadline by `increment` frames, sleep until it, and
    /// record how far off the wake-up was
    pub fn wait_for_deadline<K: Clock>(&mut self, clock: &mut K, increment: f64) {
        self.deadline += Duration::from_secs_f64(increment.max(0.0) * self.frame_period);

        let now = clock.now();
        if self.deadline > now {
            let remaining = self.deadline - now;
            if remaining > self.sleep_epsilon {
                clock.sleep(remaining);
            }
        }

        let now = clock.now();
        let shift = signed_secs(now, self.deadline);
        self.shifts.push(shift);
        self.shifting_behind = shift > self.frame_period;

        if shift > self.resync_after.as_secs_f64() {
            warn!("Running {:.0}ms behind, resynchronizing", shift * 1000.0);
            self.deadline = now;
        }
    }

    pub fn screen_ready(&self) -> bool {
        self.screen_ready
    }

    /// A frame and its position query went out
    pub fn frame_sent(&mut self, now: Instant) {
        self.screen_ready = false;
        self.ack_sent_at = Some(now);
    }

    pub fn ack_received(&mut self) {
        self.screen_ready = true;
        self.ack_sent_at = None;
    }

    /// Give up on an acknowledgement older than `timeout`.
    ///
    /// Returns true when the wait was abandoned.
    pub fn expire_ack(&mut self, now: Instant, timeout: Duration) -> bool {
        match self.ack_sent_at {
            Some(sent) if !self.screen_ready && now.saturating_duration_since(sent) >= timeout => {
                self.ack_received();
                true
            }
            _ => false,
        }
    }
}

/// Measurements of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickSample {
    /// Wall time since the previous tick, in seconds
    pub interval: f64,
    /// Time spent in the engine
    pub emulation: f64,
    /// Time spent encoding and writing video
    pub video: f64,
    /// Time spent feeding audio
    pub audio: f64,
    /// Bytes written to the terminal
    pub bytes: usize,
    pub rendered: bool,
}

/// Rolling statistics over the last second of ticks
#[derive(Debug, Clone)]
pub struct FrameStats {
    samples: Window<TickSample>,
}

/// Summary of a [`FrameStats`] window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsReport {
    pub emu_fps: f64,
    pub emu_cpu: f64,
    pub video_fps: f64,
    pub video_cpu: f64,
    pub video_kbps: f64,
    pub audio_cpu: f64,
}

impl FrameStats {
    pub fn new(window: usize) -> Self {
        Self {
            samples: Window::new(window),
        }
    }

    pub fn record(&mut self, sample: TickSample) {
        self.samples.push(sample);
    }

    pub fn report(&self) -> StatsReport {
        let total: f64 = self.samples.iter().map(|s| s.interval).sum();
        if total <= 0.0 {
            return StatsReport::default();
        }
        let sum = |f: fn(&TickSample) -> f64| self.samples.iter().map(f).sum::<f64>();
        let rendered = self.samples.iter().filter(|s| s.rendered).count() as f64;
        let bytes = self.samples.iter().map(|s| s.bytes).sum::<usize>() as f64;
        StatsReport {
            emu_fps: self.samples.len() as f64 / total,
            emu_cpu: 100.0 * sum(|s| s.emulation) / total,
            video_fps: rendered / total,
            video_cpu: 100.0 * sum(|s| s.video) / total,
            video_kbps: bytes / total / 1024.0,
            audio_cpu: 100.0 * sum(|s| s.audio) / total,
        }
    }
}

impl StatsReport {
    /// Status line shown in the terminal title
    pub fn title(&self, app: &str, rom: &str) -> String {
        format!(
            "{} | {} | Emu: {:.0} FPS - {:.0}% CPU | \
             Video: {:.0} FPS - {:.0}% CPU - {:.0} KB/s | Audio: {:.0}% CPU",
            app,
            rom,
            self.emu_fps,
            self.emu_cpu,
            self.video_fps,
            self.video_cpu,
            self.video_kbps,
            self.audio_cpu
        )
    }
}
