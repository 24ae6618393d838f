//! Terminal sessions
//!
//! A session is the connection to the terminal a picture is drawn on: a
//! local tty, or the pty of a remote client. The scheduler only talks to it
//! through [`TerminalSession`].

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossterm::queue;
use crossterm::style::ResetColor;
use crossterm::terminal::{Clear, ClearType, SetTitle};
use tracing::debug;

use crate::ui::keys::InputDecoder;

/// Device status report request; the terminal replies `ESC [ row ; col R`
const REQUEST_POSITION: &[u8] = b"\x1b[6n";

/// Events coming back from the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Ctrl+C
    Interrupt,
    /// Ctrl+D, or the input stream closed
    EndOfInput,
    /// Terminal size changed
    Resize { rows: u16, cols: u16 },
    /// Reply to a position query (1-based)
    Ack { row: u16, col: u16 },
}

/// Connection to the terminal the picture is drawn on
pub trait TerminalSession {
    /// Current size as `(rows, cols)`
    fn size(&self) -> io::Result<(u16, u16)>;

    /// Write a whole buffer and flush it
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Ask the terminal to report the cursor position
    fn ask_for_ack(&mut self) -> io::Result<()>;

    fn clear_screen(&mut self) -> io::Result<()>;

    fn set_title(&mut self, title: &str) -> io::Result<()>;

    /// Append pending events without blocking
    fn poll_events(&mut self, events: &mut Vec<SessionEvent>);
}

/// Session over any byte sink, with an optional input stream read on a
/// background thread
pub struct StreamTerminal<W: Write> {
    output: W,
    size: (u16, u16),
    decoder: InputDecoder,
    /// Resize notifications not yet handed out
    pending: Vec<SessionEvent>,
    /// Running flag shared with the reader thread
    running: Arc<AtomicBool>,
    reader_thread: Option<JoinHandle<()>>,
    /// Channel receiving raw input chunks
    input_rx: Option<Receiver<Vec<u8>>>,
}

impl<W: Write> StreamTerminal<W> {
    /// Session without an input stream; no events besides resizes
    pub fn new(output: W, rows: u16, cols: u16) -> Self {
        Self {
            output,
            size: (rows, cols),
            decoder: InputDecoder::new(),
            pending: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            reader_thread: None,
            input_rx: None,
        }
    }

    /// Session reading terminal input from `input` on a background thread
    pub fn with_input<R>(output: W, input: R, rows: u16, cols: u16) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let mut session = Self::new(output, rows, cols);
        session.start_reader(input)?;
        Ok(session)
    }

    fn start_reader<R>(&mut self, mut input: R) -> io::Result<()>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        self.input_rx = Some(rx);
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let handle = thread::Builder::new()
            .name("emuterm-input".into())
            .spawn(move || {
                let mut buffer = [0u8; 1024];
                while running.load(Ordering::SeqCst) {
                    match input.read(&mut buffer) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(buffer[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            debug!("Input stream closed: {}", e);
                            break;
                        }
                    }
                }
                running.store(false, Ordering::SeqCst);
            })?;
        self.reader_thread = Some(handle);
        Ok(())
    }

    /// Record a new terminal size, as reported by the remote end
    pub fn set_size(&mut self, rows: u16, cols: u16) {
        if self.size != (rows, cols) {
            self.size = (rows, cols);
            self.pending.push(SessionEvent::Resize { rows, cols });
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.output
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.output
    }
}

impl<W: Write> TerminalSession for StreamTerminal<W> {
    fn size(&self) -> io::Result<(u16, u16)> {
        Ok(self.size)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.output.write_all(bytes)?;
        self.output.flush()
    }

    fn ask_for_ack(&mut self) -> io::Result<()> {
        self.write(REQUEST_POSITION)
    }

    fn clear_screen(&mut self) -> io::Result<()> {
        queue!(self.output, ResetColor, Clear(ClearType::All))?;
        self.output.flush()
    }

    fn set_title(&mut self, title: &str) -> io::Result<()> {
        queue!(self.output, SetTitle(title))?;
        self.output.flush()
    }

    fn poll_events(&mut self, events: &mut Vec<SessionEvent>) {
        events.append(&mut self.pending);

        let Some(rx) = &self.input_rx else {
            return;
        };
        loop {
            match rx.try_recv() {
                Ok(data) => self.decoder.feed(&data, events),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Input stream ended");
                    self.input_rx = None;
                    events.push(SessionEvent::EndOfInput);
                    break;
                }
            }
        }
    }
}

impl<W: Write> Drop for StreamTerminal<W> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // A blocked read cannot be cancelled; only join a thread that is done
        if let Some(handle) = self.reader_thread.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    fn collect_until_end(session: &mut StreamTerminal<Vec<u8>>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for _ in 0..200 {
            session.poll_events(&mut events);
            if events.contains(&SessionEvent::EndOfInput) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        events
    }

    #[test]
    fn test_reader_thread_decodes_input() {
        let input = Cursor::new(b"\x1b[5;9R\x03".to_vec());
        let mut session = StreamTerminal::with_input(Vec::new(), input, 24, 80).unwrap();

        let events = collect_until_end(&mut session);
        assert_eq!(
            events,
            vec![
                SessionEvent::Ack { row: 5, col: 9 },
                SessionEvent::Interrupt,
                SessionEvent::EndOfInput,
            ]
        );
    }

    #[test]
    fn test_no_input_means_no_events() {
        let mut session = StreamTerminal::new(Vec::new(), 24, 80);
        let mut events = Vec::new();
        session.poll_events(&mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn test_resize_is_reported_once() {
        let mut session = StreamTerminal::new(Vec::new(), 24, 80);
        session.set_size(24, 80);
        session.set_size(30, 100);

        let mut events = Vec::new();
        session.poll_events(&mut events);
        session.poll_events(&mut events);
        assert_eq!(events, vec![SessionEvent::Resize { rows: 30, cols: 100 }]);
        assert_eq!(session.size().unwrap(), (30, 100));
    }

    #[test]
    fn test_output_sequences() {
        let mut session = StreamTerminal::new(Vec::new(), 24, 80);
        session.write(b"abc").unwrap();
        session.ask_for_ack().unwrap();
        session.set_title("demo").unwrap();
        assert_eq!(session.get_ref().as_slice(), b"abc\x1b[6n\x1b]0;demo\x07");
    }
}
