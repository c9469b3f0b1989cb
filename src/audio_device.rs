use crate::{synthesizer::Synthesizer, Sample, NUM_CHANNELS};

use anyhow::{anyhow, Context, Result};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, SampleFormat, SizedSample, StreamConfig,
};
use log::{error, info};

/// The default output device, fed directly from the realtime audio callback.
///
/// The callback owns the synthesizer and renders a new block whenever the previous one has been
/// copied out, so it never waits on the event source.
pub struct AudioOutputDeviceStream {
    stream: cpal::Stream,
}

impl AudioOutputDeviceStream {
    /// Query the default device's sample rate without opening a stream.
    pub fn default_sample_rate() -> Result<u32> {
        let device = default_device()?;
        let supported_config = device
            .default_output_config()
            .context("Failed to query default output config")?;

        Ok(supported_config.sample_rate().0)
    }

    pub fn connect_default(synth: Synthesizer) -> Result<AudioOutputDeviceStream> {
        let device = default_device()?;
        let supported_config = device
            .default_output_config()
            .context("Failed to query default output config")?;
        let sample_format = supported_config.sample_format();
        let config = supported_config.config();
        info!(
            "Creating output device stream with config:\n{:?} ({:?})",
            config, sample_format
        );
        if config.sample_rate.0 as f32 != synth.sample_hz() {
            return Err(anyhow!(
                "Synthesizer runs at {} Hz but the device wants {} Hz",
                synth.sample_hz(),
                config.sample_rate.0
            ));
        }

        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16>(&device, &config, synth)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, synth)?,
            SampleFormat::I32 => build_stream::<i32>(&device, &config, synth)?,
            SampleFormat::F32 => build_stream::<f32>(&device, &config, synth)?,
            SampleFormat::F64 => build_stream::<f64>(&device, &config, synth)?,
            other => return Err(anyhow!("Unsupported output sample format {:?}", other)),
        };

        Ok(AudioOutputDeviceStream { stream })
    }

    pub fn play(&self) -> Result<()> {
        self.stream
            .play()
            .context("Failed to play output device stream")
    }
}

fn default_device() -> Result<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    synth: Synthesizer,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<Sample>,
{
    let mut source = BlockSource::new(synth);
    let device_channels = usize::from(config.channels);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                source.fill(data, device_channels)
            },
            |err| error!("Output stream error: {}", err),
            None,
        )
        .context("Failed to build CPAL output stream")?;

    Ok(stream)
}

/// Hands out rendered frames across device buffers of any length.
struct BlockSource {
    synth: Synthesizer,
    block: Vec<Sample>,
    /// Next unread frame in `block`.
    cursor: usize,
}

impl BlockSource {
    fn new(synth: Synthesizer) -> Self {
        let block_len = synth.block_size() * NUM_CHANNELS;
        BlockSource {
            synth,
            block: vec![0; block_len],
            cursor: synth_frames(block_len),
        }
    }

    /// Fill an interleaved device buffer with `device_channels` channels. Mono devices get the
    /// left channel; channels past the second repeat it.
    fn fill<T: SizedSample + FromSample<Sample>>(&mut self, data: &mut [T], device_channels: usize) {
        for frame in data.chunks_mut(device_channels) {
            if self.cursor >= synth_frames(self.block.len()) {
                self.block.copy_from_slice(self.synth.render_block());
                self.cursor = 0;
            }
            let left = self.block[self.cursor * NUM_CHANNELS];
            let right = self.block[self.cursor * NUM_CHANNELS + 1];
            for (channel, out) in frame.iter_mut().enumerate() {
                let sample = if channel == 1 { right } else { left };
                *out = <T as FromSample<Sample>>::from_sample_(sample);
            }
            self.cursor += 1;
        }
    }
}

fn synth_frames(block_len: usize) -> usize {
    block_len / NUM_CHANNELS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, SynthEvent};

    fn source(block_size: usize) -> BlockSource {
        let (mut synth, _sender) = Synthesizer::new(EngineConfig {
            sample_rate: 8_000.0,
            block_size,
            ..EngineConfig::default()
        })
        .expect("valid config");
        synth.apply(SynthEvent::NoteOn {
            note: 69,
            velocity: 127,
        });
        BlockSource::new(synth)
    }

    #[test]
    fn odd_device_buffers_pull_whole_blocks() {
        let mut source = source(64);
        let mut data = vec![0.0f32; 2 * 100];
        source.fill(&mut data, 2);
        assert_eq!(source.synth.blocks_rendered(), 2);
        assert_eq!(source.cursor, 36);
        assert!(data.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn maps_to_other_channel_counts() {
        let mut source = source(32);
        let mut data = vec![0i16; 4 * 32];
        source.fill(&mut data, 4);
        for frame in data.chunks(4) {
            assert_eq!(frame[0], frame[2]);
            assert_eq!(frame[0], frame[3]);
        }

        let mut mono = vec![0i16; 10];
        source.fill(&mut mono, 1);
        assert_eq!(source.synth.blocks_rendered(), 2);
    }
}
