//! Controller input sources
//!
//! The scheduler samples input once per tick through an [`InputGetter`].
//! Getters may be backed by live devices, by a replay log, or by a plain
//! closure; they are selected once at session setup.
//!
//! Replay logs use the BizHawk text format, one line per frame:
//!
//! ```text
//! |UDLRSsBA|
//! |........|
//! |U......A|
//! ```
//!
//! A `.` means released, any other character means pressed. BizHawk movie
//! files (`.bk2`) are zip archives carrying the log as `Input Log.txt`;
//! [`open_input_log`] accepts both forms.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Write};
use std::path::Path;

use bitflags::bitflags;
use tracing::{debug, warn};
use zip::ZipArchive;

bitflags! {
    /// Snapshot of the pressed controller buttons
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputMask: u8 {
        const A      = 0x01;
        const B      = 0x02;
        const SELECT = 0x04;
        const START  = 0x08;
        const RIGHT  = 0x10;
        const LEFT   = 0x20;
        const UP     = 0x40;
        const DOWN   = 0x80;
    }
}

/// Column order of buttons in an input log line
const LOG_ORDER: [(InputMask, char); 8] = [
    (InputMask::UP, 'U'),
    (InputMask::DOWN, 'D'),
    (InputMask::LEFT, 'L'),
    (InputMask::RIGHT, 'R'),
    (InputMask::START, 'S'),
    (InputMask::SELECT, 's'),
    (InputMask::B, 'B'),
    (InputMask::A, 'A'),
];

/// Default number of log lines skipped to compensate for the missing boot ROM
pub const DEFAULT_SKIP_LINES: usize = 188;

/// Source of one input snapshot per tick
pub trait InputGetter {
    fn get_input(&mut self) -> InputMask;
}

impl<F> InputGetter for F
where
    F: FnMut() -> InputMask,
{
    fn get_input(&mut self) -> InputMask {
        self()
    }
}

/// Input source that never presses anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl InputGetter for NoInput {
    fn get_input(&mut self) -> InputMask {
        InputMask::empty()
    }
}

/// Parse one `|UDLRSsBA|` log line. Returns `None` for non-input lines.
pub fn parse_log_line(line: &str) -> Option<InputMask> {
    let body = line.strip_prefix('|')?;
    let mut mask = InputMask::empty();
    for ((button, _), c) in LOG_ORDER.iter().zip(body.chars()) {
        if c != '.' {
            mask |= *button;
        }
    }
    Some(mask)
}

/// Format a mask as a log line (without trailing newline)
pub fn format_log_line(mask: InputMask) -> String {
    let mut line = String::with_capacity(10);
    line.push('|');
    for (button, c) in LOG_ORDER {
        line.push(if mask.contains(button) { c } else { '.' });
    }
    line.push('|');
    line
}

/// Archive entry holding the log inside a BizHawk movie
pub const MOVIE_LOG_ENTRY: &str = "Input Log.txt";

/// Open an input log, either a BizHawk movie archive or a plain text file
pub fn open_input_log(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let mut archive = match ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(e) => {
            debug!("{} is not a movie archive ({}), reading as text", path.display(), e);
            return Ok(Box::new(BufReader::new(File::open(path)?)));
        }
    };

    let mut log = Vec::new();
    archive
        .by_name(MOVIE_LOG_ENTRY)
        .map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no {:?} in movie archive: {}", MOVIE_LOG_ENTRY, e),
            )
        })?
        .read_to_end(&mut log)?;
    debug!("Read {} bytes of input log from {}", log.len(), path.display());
    Ok(Box::new(Cursor::new(log)))
}

/// Deterministic input replayed from a log
///
/// Once the log is exhausted every tick reads as "nothing pressed".
pub struct ReplayInput<R> {
    reader: Option<R>,
    /// Index of the next line to read
    line_index: usize,
    /// Lines with an index below this are ignored
    skip: usize,
    line: String,
}

impl<R: BufRead> ReplayInput<R> {
    pub fn new(reader: R, skip: usize) -> Self {
        Self {
            reader: Some(reader),
            line_index: 0,
            skip,
            line: String::new(),
        }
    }

    fn next_mask(&mut self) -> Option<InputMask> {
        let reader = self.reader.as_mut()?;
        loop {
            self.line.clear();
            match reader.read_line(&mut self.line) {
                Ok(0) => {
                    debug!("Input log exhausted after {} lines", self.line_index);
                    self.reader = None;
                    return None;
                }
                Ok(_) => {
                    let index = self.line_index;
                    self.line_index += 1;
                    if index < self.skip {
                        continue;
                    }
                    if let Some(mask) = parse_log_line(&self.line) {
                        return Some(mask);
                    }
                }
                Err(e) => {
                    warn!("Failed to read input log: {}", e);
                    self.reader = None;
                    return None;
                }
            }
        }
    }
}

impl<R: BufRead> InputGetter for ReplayInput<R> {
    fn get_input(&mut self) -> InputMask {
        self.next_mask().unwrap_or_default()
    }
}

/// Wraps another getter and records every snapshot it returns
pub struct RecordingInput<G, W> {
    inner: G,
    writer: W,
    failed: bool,
}

impl<G: InputGetter, W: Write> RecordingInput<G, W> {
    pub fn new(inner: G, writer: W) -> Self {
        Self {
            inner,
            writer,
            failed: false,
        }
    }

    /// Flush and return the underlying writer
    pub fn into_writer(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<G: InputGetter, W: Write> InputGetter for RecordingInput<G, W> {
    fn get_input(&mut self) -> InputMask {
        let mask = self.inner.get_input();
        if !self.failed {
            if let Err(e) = writeln!(self.writer, "{}", format_log_line(mask)) {
                // Keep playing; the recording is lost but the session is not
                warn!("Input recording stopped: {}", e);
                self.failed = true;
            }
        }
        mask
    }
}
