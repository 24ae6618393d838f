//! Error types for the presentation pipeline.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The emulation engine refused the ROM.
    #[error("Emulator failed to load (code {code})")]
    EmulatorLoad { code: i32 },

    #[error("No color mode seems to be supported by this terminal")]
    NoColor,

    /// The terminal went away (broken pipe, connection reset, ...).
    #[error("Terminal connection lost: {0}")]
    Disconnected(#[source] io::Error),

    #[error("Terminal I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Whether a write error means the terminal can no longer be reached.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero
    )
}

impl Error {
    /// Wrap a terminal I/O error, keeping disconnects distinguishable.
    pub fn from_terminal(err: io::Error) -> Self {
        if is_disconnect(&err) {
            Error::Disconnected(err)
        } else {
            Error::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_terminal() {
        let err = Error::from_terminal(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(err, Error::Disconnected(_)));
        let err = Error::from_terminal(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_disconnect_classification() {
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::Interrupted)));
    }
}
