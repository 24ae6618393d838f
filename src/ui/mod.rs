//! Terminal-facing rendering and input handling.
//!
//! - **blit**: half-block frame encoder
//! - **color**: color modes, quantization and detection
//! - **keys**: decoding of bytes sent back by the terminal
//! - **terminal**: raw-mode local terminal session

pub mod blit;
pub mod color;
pub mod keys;
pub mod terminal;

pub use blit::{FrameEncoder, Viewport};
pub use color::{color_escape, detect_color_mode, quantize, ColorMode};
pub use keys::InputDecoder;
pub use terminal::LocalTerminal;
