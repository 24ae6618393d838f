//! Built-in demo engine
//!
//! A stand-in console with Game Boy timing: scrolling color bands, a box
//! that follows the d-pad, and a quiet square-wave tone. Lets the binary run
//! without an external core.

use crate::core::console::{Console, FrameAdvance, Geometry, PixelGrid};
use crate::input::InputMask;

pub const WIDTH: usize = 160;
pub const HEIGHT: usize = 144;
pub const FPS: f64 = 59.727500569606;
pub const TICKS_IN_FRAME: usize = 35112;

const BOX_SIZE: i32 = 16;
const TONE_HZ: f64 = 440.0;
const TONE_AMPLITUDE: i16 = 2000;

const BANDS: [u32; 8] = [
    0x0f380f, 0x306230, 0x8bac0f, 0x9bbc0f, 0xe0f8d0, 0x88c070, 0x346856, 0x081820,
];

/// Test-pattern console
#[derive(Debug, Clone)]
pub struct DemoConsole {
    frame: u64,
    input: InputMask,
    box_x: i32,
    box_y: i32,
    /// Position in the tone period, in samples
    phase: usize,
}

impl Default for DemoConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoConsole {
    pub fn new() -> Self {
        Self {
            frame: 0,
            input: InputMask::empty(),
            box_x: (WIDTH as i32 - BOX_SIZE) / 2,
            box_y: (HEIGHT as i32 - BOX_SIZE) / 2,
            phase: 0,
        }
    }

    fn move_box(&mut self) {
        let mut dx = 0;
        let mut dy = 0;
        if self.input.contains(InputMask::LEFT) {
            dx -= 1;
        }
        if self.input.contains(InputMask::RIGHT) {
            dx += 1;
        }
        if self.input.contains(InputMask::UP) {
            dy -= 1;
        }
        if self.input.contains(InputMask::DOWN) {
            dy += 1;
        }
        self.box_x = (self.box_x + dx).clamp(0, WIDTH as i32 - BOX_SIZE);
        self.box_y = (self.box_y + dy).clamp(0, HEIGHT as i32 - BOX_SIZE);
    }

    fn draw(&self, video: &mut PixelGrid) {
        let shift = self.frame as usize / 2;
        for y in 0..video.height().min(HEIGHT) {
            for x in 0..video.width().min(WIDTH) {
                video.set(x, y, BANDS[((x + y + shift) / 12) % BANDS.len()]);
            }
        }

        let color = if self.input.contains(InputMask::A) {
            0xff4040
        } else {
            0xffffff
        };
        for y in self.box_y..self.box_y + BOX_SIZE {
            for x in self.box_x..self.box_x + BOX_SIZE {
                video.set(x as usize, y as usize, color);
            }
        }
    }

    fn play(&mut self, audio: &mut [[i16; 2]]) -> usize {
        let period = (TICKS_IN_FRAME as f64 * FPS / TONE_HZ) as usize;
        let count = audio.len().min(TICKS_IN_FRAME);
        let muted = self.input.contains(InputMask::B);
        for frame in audio[..count].iter_mut() {
            let value = if muted {
                0
            } else if self.phase < period / 2 {
                TONE_AMPLITUDE
            } else {
                -TONE_AMPLITUDE
            };
            *frame = [value, value];
            self.phase = (self.phase + 1) % period;
        }
        count
    }
}

impl Console for DemoConsole {
    fn geometry(&self) -> Geometry {
        Geometry {
            width: WIDTH,
            height: HEIGHT,
            fps: FPS,
            ticks_in_frame: TICKS_IN_FRAME,
        }
    }

    fn name(&self) -> &str {
        "demo"
    }

    fn set_input(&mut self, input: InputMask) {
        self.input = input;
    }

    fn advance_one_frame(&mut self, video: &mut PixelGrid, audio: &mut [[i16; 2]]) -> FrameAdvance {
        self.move_box();
        self.draw(video);
        let samples = self.play(audio);
        self.frame += 1;
        FrameAdvance {
            offset: 1,
            samples,
        }
    }
}
