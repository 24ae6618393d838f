//! Emulation engine contract
//!
//! The engine itself (CPU, PPU, APU, ROM loading) lives outside this crate.
//! The pipeline only needs to advance it one frame at a time and read back
//! the pixels and audio it produced.

use crate::input::InputMask;

/// Fixed characteristics of an emulated console
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Screen width in pixels
    pub width: usize,
    /// Screen height in pixels (even: two pixels per terminal cell)
    pub height: usize,
    /// Native frame rate
    pub fps: f64,
    /// Engine ticks (audio samples) per frame
    pub ticks_in_frame: usize,
}

impl Geometry {
    /// Native audio sample rate of the engine
    pub fn sample_rate(&self) -> f64 {
        self.fps * self.ticks_in_frame as f64
    }
}

/// Packed `0x00RRGGBB` pixels, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl PixelGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, color: u32) {
        self.pixels[y * self.width + x] = color;
    }

    pub fn row(&self, y: usize) -> &[u32] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    pub fn fill(&mut self, color: u32) {
        self.pixels.fill(color);
    }

    /// Copy another grid of the same size without reallocating
    pub fn copy_from(&mut self, other: &PixelGrid) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        self.pixels.copy_from_slice(&other.pixels);
    }
}

/// Result of one `advance_one_frame` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameAdvance {
    /// Positive when the video buffer was repainted during this call
    pub offset: i32,
    /// Number of stereo samples written to the audio buffer
    pub samples: usize,
}

impl FrameAdvance {
    pub fn repainted(&self) -> bool {
        self.offset > 0
    }
}

/// An emulation engine driven one frame at a time
pub trait Console {
    fn geometry(&self) -> Geometry;

    /// Short name shown in the status title (usually the ROM file name)
    fn name(&self) -> &str;

    /// Load the game. A non-zero engine code is returned as `Err`.
    fn load(&mut self) -> Result<(), i32> {
        Ok(())
    }

    fn set_input(&mut self, input: InputMask);

    /// Run until the engine returns, writing pixels into `video` and
    /// interleaved stereo frames into `audio`.
    fn advance_one_frame(&mut self, video: &mut PixelGrid, audio: &mut [[i16; 2]]) -> FrameAdvance;
}
