//! Audio pacing
//!
//! The engine produces a variable number of samples per tick at its native
//! rate. The device wants fixed-size buffers at its own rate, pulled from a
//! real-time thread. [`AudioPacer`] resamples on the render loop side and
//! hands whole blocks to [`AudioDrain`] through a wait-free SPSC ring.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::debug;

/// Device callback periods per second; one block covers one period
pub const BLOCKS_PER_SECOND: u32 = 60;

/// Queue capacity in blocks (about 100ms)
pub const QUEUE_BLOCKS: usize = 6;

/// Volume reduction applied to every finished block
const ATTENUATION: i16 = 4;

const CHANNELS: usize = 2;

/// Consumer of engine audio
pub trait AudioSink {
    /// Queue interleaved stereo frames at the engine rate. Never blocks.
    fn send(&mut self, samples: &[[i16; 2]]);

    fn set_speed(&mut self, speed: f64);

    /// Whole blocks waiting for the device
    fn queued_blocks(&self) -> usize {
        0
    }
}

/// Sink used when no audio device is available
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAudio;

impl AudioSink for NoAudio {
    fn send(&mut self, _samples: &[[i16; 2]]) {}

    fn set_speed(&mut self, _speed: f64) {}
}

/// Causal linear resampler
///
/// Output lags the input by one sample: every output frame is interpolated
/// between the last two input frames seen.
#[derive(Debug, Clone)]
struct LinearResampler {
    input_rate: f64,
    output_rate: f64,
    /// Input frames advanced per output frame
    step: f64,
    /// Position of the next output frame, relative to `prev`
    position: f64,
    prev: [i16; 2],
}

impl LinearResampler {
    fn new(input_rate: f64, output_rate: f64, speed: f64) -> Self {
        let mut resampler = Self {
            input_rate,
            output_rate,
            step: 1.0,
            position: 0.0,
            prev: [0; 2],
        };
        resampler.set_speed(speed);
        resampler
    }

    fn set_speed(&mut self, speed: f64) {
        self.step = self.input_rate * speed / self.output_rate;
    }

    fn process<F: FnMut([i16; 2])>(&mut self, input: &[[i16; 2]], mut emit: F) {
        for &frame in input {
            while self.position < 1.0 {
                emit(lerp(self.prev, frame, self.position));
                self.position += self.step;
            }
            self.position -= 1.0;
            self.prev = frame;
        }
    }
}

#[inline]
fn lerp(a: [i16; 2], b: [i16; 2], t: f64) -> [i16; 2] {
    let mix = |a: i16, b: i16| (a as f64 + (b as f64 - a as f64) * t).round() as i16;
    [mix(a[0], b[0]), mix(a[1], b[1])]
}

/// Producer half: resamples engine audio into blocks and queues them
pub struct AudioPacer {
    resampler: LinearResampler,
    /// Partially filled block, interleaved
    block: Vec<i16>,
    filled: usize,
    producer: HeapProd<i16>,
    dropped: u64,
}

/// Consumer half, owned by the device callback
pub struct AudioDrain {
    consumer: HeapCons<i16>,
}

impl AudioPacer {
    /// Create a pacer converting `input_rate` to `output_rate`, and the
    /// drain to hand to the device
    pub fn new(input_rate: f64, output_rate: u32, speed: f64) -> (Self, AudioDrain) {
        let block_len = (output_rate / BLOCKS_PER_SECOND) as usize * CHANNELS;
        let ring = HeapRb::<i16>::new(block_len * QUEUE_BLOCKS);
        let (producer, consumer) = ring.split();
        let pacer = Self {
            resampler: LinearResampler::new(input_rate, output_rate as f64, speed),
            block: vec![0; block_len],
            filled: 0,
            producer,
            dropped: 0,
        };
        (pacer, AudioDrain { consumer })
    }

    /// Interleaved samples per block
    pub fn block_len(&self) -> usize {
        self.block.len()
    }

    /// Blocks dropped because the queue was full
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped
    }
}

impl AudioSink for AudioPacer {
    fn send(&mut self, samples: &[[i16; 2]]) {
        let Self {
            resampler,
            block,
            filled,
            producer,
            dropped,
        } = self;

        resampler.process(samples, |frame| {
            block[*filled] = frame[0];
            block[*filled + 1] = frame[1];
            *filled += CHANNELS;
            if *filled < block.len() {
                return;
            }
            *filled = 0;
            for sample in block.iter_mut() {
                *sample /= ATTENUATION;
            }
            if producer.vacant_len() >= block.len() {
                producer.push_slice(block);
            } else {
                *dropped += 1;
                if *dropped % 60 == 1 {
                    debug!("Audio queue full, {} blocks dropped so far", dropped);
                }
            }
        });
    }

    fn set_speed(&mut self, speed: f64) {
        self.resampler.set_speed(speed);
    }

    fn queued_blocks(&self) -> usize {
        self.producer.occupied_len() / self.block.len()
    }
}

impl AudioDrain {
    /// Fill a device buffer of interleaved stereo samples.
    ///
    /// Takes queued audio only when the whole buffer can be served, else
    /// writes silence. Never allocates or blocks.
    pub fn stream_callback(&mut self, out: &mut [i16]) {
        if self.consumer.occupied_len() >= out.len() {
            self.consumer.pop_slice(out);
        } else {
            out.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_block_size() {
        let (pacer, _drain) = AudioPacer::new(48_000.0, 48_000, 1.0);
        assert_eq!(pacer.block_len(), 1600);
    }

    #[test]
    fn test_block_is_attenuated_and_delayed() {
        let (mut pacer, mut drain) = AudioPacer::new(48_000.0, 48_000, 1.0);
        pacer.send(&[[400, -400]; 800]);
        assert_eq!(pacer.queued_blocks(), 1);

        let mut out = vec![1i16; 1600];
        drain.stream_callback(&mut out);
        // First output frame interpolates from the initial silence
        assert_eq!(&out[..4], &[0, 0, 100, -100]);
        assert!(out[2..].chunks(2).all(|f| f == [100, -100]));
        assert_eq!(pacer.queued_blocks(), 0);
    }

    #[test]
    fn test_empty_queue_gives_silence() {
        let (_pacer, mut drain) = AudioPacer::new(48_000.0, 48_000, 1.0);
        let mut out = vec![7i16; 512];
        drain.stream_callback(&mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_partial_block_not_played() {
        let (mut pacer, mut drain) = AudioPacer::new(48_000.0, 48_000, 1.0);
        pacer.send(&[[1000, 1000]; 400]);
        assert_eq!(pacer.queued_blocks(), 0);

        let mut out = vec![7i16; 256];
        drain.stream_callback(&mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (mut pacer, _drain) = AudioPacer::new(48_000.0, 48_000, 1.0);
        // Twenty blocks worth, nobody draining
        for _ in 0..20 {
            pacer.send(&[[1, 1]; 800]);
        }
        assert_eq!(pacer.queued_blocks(), QUEUE_BLOCKS);
        assert!(pacer.dropped_blocks() >= 13);
    }

    #[test]
    fn test_resampling_ratio() {
        // Halving the rate turns two blocks of input into one block of output
        let (mut pacer, _drain) = AudioPacer::new(96_000.0, 48_000, 1.0);
        pacer.send(&[[0, 0]; 1600]);
        assert_eq!(pacer.queued_blocks(), 1);

        // Double speed has the same effect
        let (mut pacer, _drain) = AudioPacer::new(48_000.0, 48_000, 2.0);
        pacer.send(&[[0, 0]; 1600]);
        assert_eq!(pacer.queued_blocks(), 1);

        // And can be changed on the fly
        let (mut pacer, _drain) = AudioPacer::new(48_000.0, 48_000, 2.0);
        pacer.set_speed(1.0);
        pacer.send(&[[0, 0]; 1600]);
        assert_eq!(pacer.queued_blocks(), 2);
    }

    #[test]
    fn test_resampler_interpolates() {
        let mut resampler = LinearResampler::new(1.0, 2.0, 1.0);
        let mut out = Vec::new();
        resampler.process(&[[100, 0], [200, 0]], |f| out.push(f[0]));
        assert_eq!(out, vec![0, 50, 100, 150]);
    }

    #[test]
    fn test_no_audio_is_inert() {
        let mut sink = NoAudio;
        sink.send(&[[1, 1]; 10]);
        sink.set_speed(3.0);
        assert_eq!(sink.queued_blocks(), 0);
    }
}
