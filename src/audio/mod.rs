//! Audio subsystem
//!
//! - `pacer`: resampling and the block queue between render loop and device
//! - `output`: cpal device stream

pub mod output;
pub mod pacer;

pub use output::{AudioError, AudioOutput};
pub use pacer::{AudioDrain, AudioPacer, AudioSink, NoAudio};
