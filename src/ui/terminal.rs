//! Local terminal session using crossterm

use std::io::{self, Stdout};

use crossterm::{
    cursor::{Hide, Show},
    execute,
    style::{Attribute, ResetColor, SetAttribute},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use tracing::debug;

use crate::core::session::{SessionEvent, StreamTerminal, TerminalSession};

/// The controlling terminal, in raw mode for the lifetime of the value
pub struct LocalTerminal {
    inner: StreamTerminal<Stdout>,
    active: bool,
}

impl LocalTerminal {
    /// Switch the terminal to raw mode and start reading stdin
    pub fn open() -> io::Result<Self> {
        let (cols, rows) = terminal::size()?;
        terminal::enable_raw_mode()?;

        let inner = match StreamTerminal::with_input(io::stdout(), io::stdin(), rows, cols) {
            Ok(inner) => inner,
            Err(e) => {
                let _ = terminal::disable_raw_mode();
                return Err(e);
            }
        };
        let mut local = Self {
            inner,
            active: true,
        };
        let stdout = local.inner.get_mut();
        execute!(
            stdout,
            EnterAlternateScreen,
            DisableLineWrap,
            Hide,
            Clear(ClearType::All)
        )?;
        debug!("Terminal initialized ({}x{})", cols, rows);
        Ok(local)
    }

    /// Put the terminal back the way it was. Safe to call twice.
    pub fn restore(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        let stdout = self.inner.get_mut();
        let _ = execute!(stdout, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(stdout, Clear(ClearType::All), Show, EnableLineWrap);
        let _ = execute!(stdout, LeaveAlternateScreen);

        // Raw mode matters most
        terminal::disable_raw_mode()
    }
}

impl TerminalSession for LocalTerminal {
    fn size(&self) -> io::Result<(u16, u16)> {
        let (cols, rows) = terminal::size()?;
        Ok((rows, cols))
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write(bytes)
    }

    fn ask_for_ack(&mut self) -> io::Result<()> {
        self.inner.ask_for_ack()
    }

    fn clear_screen(&mut self) -> io::Result<()> {
        self.inner.clear_screen()
    }

    fn set_title(&mut self, title: &str) -> io::Result<()> {
        self.inner.set_title(title)
    }

    fn poll_events(&mut self, events: &mut Vec<SessionEvent>) {
        self.inner.poll_events(events)
    }
}

impl Drop for LocalTerminal {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}
