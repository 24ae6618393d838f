//! Audio device output using cpal

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use thiserror::Error;
use tracing::{debug, error};

use super::pacer::{AudioDrain, AudioPacer};

/// Interleaved samples converted per pass in the device callback
const SCRATCH_SAMPLES: usize = 2048;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output device available")]
    NoDevice,

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to get default output config: {0}")]
    Config(#[source] cpal::DefaultStreamConfigError),

    #[error("Failed to build audio stream: {0}")]
    Build(#[source] cpal::BuildStreamError),

    #[error("Failed to play audio stream: {0}")]
    Play(#[source] cpal::PlayStreamError),
}

/// Running output stream fed by an [`AudioDrain`]
pub struct AudioOutput {
    /// Kept alive for the duration of the session
    _stream: cpal::Stream,
    sample_rate: u32,
}

impl AudioOutput {
    /// Open the default device and return the stream together with the
    /// pacer feeding it
    pub fn open(input_rate: f64, speed: f64) -> Result<(Self, AudioPacer), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let supported = device
            .default_output_config()
            .map_err(AudioError::Config)?;

        let sample_rate = supported.sample_rate().0;
        let format = supported.sample_format();
        let config = StreamConfig {
            channels: 2,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let (pacer, drain) = AudioPacer::new(input_rate, sample_rate, speed);
        let stream = match format {
            SampleFormat::I16 => build_stream(&device, &config, drain, |s| s),
            SampleFormat::F32 => build_stream(&device, &config, drain, |s| s as f32 / 32768.0),
            SampleFormat::U16 => {
                build_stream(&device, &config, drain, |s| (s as i32 + 32768) as u16)
            }
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }?;

        stream.play().map_err(AudioError::Play)?;
        debug!("Audio stream started at {} Hz ({:?})", sample_rate, format);

        Ok((
            Self {
                _stream: stream,
                sample_rate,
            },
            pacer,
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn build_stream<T, F>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut drain: AudioDrain,
    convert: F,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + Send + 'static,
    F: Fn(i16) -> T + Send + 'static,
{
    let mut scratch = [0i16; SCRATCH_SAMPLES];
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(SCRATCH_SAMPLES) {
                    let scratch = &mut scratch[..chunk.len()];
                    drain.stream_callback(scratch);
                    for (out, &sample) in chunk.iter_mut().zip(scratch.iter()) {
                        *out = convert(sample);
                    }
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(AudioError::Build)
}
