//! emuterm - real-time terminal front-end for emulators
//!
//! Renders the frames of an emulation engine to a character terminal and
//! keeps an audio device fed, over local ttys and remote ptys alike.
//!
//! # Pipeline
//!
//! - **Pacing**: deadline based, re-anchored to itself so jitter never turns
//!   into drift
//! - **Half-block encoding**: two pixels per cell, only changed cells are
//!   written, colors and cursor moves are memoized
//! - **Flow control**: a cursor position query follows each frame; the next
//!   frame waits for the reply (or a timeout)
//! - **Audio**: linear resampling into fixed blocks on a wait-free queue
//!   drained by the device callback

pub mod audio;
pub mod config;
pub mod core;
pub mod demo;
pub mod error;
pub mod input;
pub mod ui;

pub use crate::core::{
    CancelReason, Console, FrameScheduler, SchedulerOptions, SessionOutcome, TerminalSession,
    TickOutcome,
};
pub use crate::error::{Error, Result};
pub use crate::input::{InputGetter, InputMask};
pub use crate::ui::ColorMode;
