//! Core presentation pipeline.
//!
//! - **console**: contract of the emulation engine being driven
//! - **pacing**: clock, deadline pacing, flow-control flag, statistics
//! - **scheduler**: the per-tick emulate/render/sleep loop
//! - **session**: terminal connection the frames are written to
//!
//! # Architecture
//!
//! ```text
//! FrameScheduler
//! ├── Console (advance_one_frame -> pixels + samples)
//! ├── AudioSink (resampled block queue)
//! ├── FrameEncoder (half-block diff)
//! └── TerminalSession
//!     ├── output (escape sequences)
//!     └── input (Ctrl+C, Ctrl+D, position reports)
//! ```

pub mod console;
pub mod pacing;
pub mod scheduler;
pub mod session;

pub use console::{Console, FrameAdvance, Geometry, PixelGrid};
pub use pacing::{Clock, SystemClock};
pub use scheduler::{CancelReason, FrameScheduler, SchedulerOptions, SessionOutcome, TickOutcome};
pub use session::{SessionEvent, StreamTerminal, TerminalSession};
