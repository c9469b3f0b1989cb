use crate::{midi::TimedEvent, synthesizer::Synthesizer, Sample, NUM_CHANNELS};

use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

/// Writes rendered blocks as a 16-bit stereo WAV stream.
pub struct WavRecorder<W: Write + Seek> {
    writer: hound::WavWriter<W>,
    frames_written: u64,
}

fn wav_spec(sample_hz: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: NUM_CHANNELS as u16,
        sample_rate: sample_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// The WAV header rate for audio rendered at `sample_hz`. WAV headers store whole hertz, so a
/// fractional rate is refused rather than written as a header that lies about the audio.
pub fn wav_sample_rate(sample_hz: f32) -> Result<u32> {
    if sample_hz.fract() != 0.0 || sample_hz < 1.0 || sample_hz > u32::MAX as f32 {
        bail!("WAV output needs a whole-hertz sample rate, got {} Hz", sample_hz);
    }

    Ok(sample_hz as u32)
}

impl WavRecorder<BufWriter<File>> {
    pub fn create(path: &Path, sample_hz: u32) -> Result<Self> {
        let writer = hound::WavWriter::create(path, wav_spec(sample_hz))
            .with_context(|| format!("Failed to create WAV file {}", path.display()))?;

        Ok(WavRecorder {
            writer,
            frames_written: 0,
        })
    }
}

impl<W: Write + Seek> WavRecorder<W> {
    pub fn new(inner: W, sample_hz: u32) -> Result<Self> {
        let writer =
            hound::WavWriter::new(inner, wav_spec(sample_hz)).context("Failed to start WAV stream")?;

        Ok(WavRecorder {
            writer,
            frames_written: 0,
        })
    }

    /// Append one interleaved stereo block.
    pub fn write_block(&mut self, block: &[Sample]) -> Result<()> {
        for &s in block {
            self.writer
                .write_sample(s)
                .context("WAV writer failed to write sample")?;
        }
        self.frames_written += (block.len() / NUM_CHANNELS) as u64;

        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn finalize(self) -> Result<()> {
        self.writer
            .finalize()
            .context("Failed to finalize WAV file")?;
        info!("Flushed WAV file buffer.");

        Ok(())
    }
}

/// Render `timeline` offline, as fast as possible, into `recorder`.
///
/// Events are applied at block boundaries: every event due at or before a block's start time is
/// applied before that block renders. After the last event, rendering continues until every voice
/// has finished or `tail_seconds` have passed. Returns the number of blocks written.
pub fn render_timeline<W: Write + Seek>(
    timeline: &[TimedEvent],
    synth: &mut Synthesizer,
    recorder: &mut WavRecorder<W>,
    tail_seconds: f64,
) -> Result<u64> {
    let block_seconds = f64::from(synth.block_duration());
    let last_event_seconds = timeline
        .last()
        .map(|t| t.seconds)
        .filter(|s| s.is_finite())
        .unwrap_or(0.0);
    let end_seconds = last_event_seconds + tail_seconds.max(0.0);

    let mut pending = timeline.iter().peekable();
    let mut block_start = 0.0;
    let mut blocks = 0;
    loop {
        // An unordered time (NaN) counts as due.
        while let Some(timed) = pending.next_if(|t| !(t.seconds > block_start)) {
            synth.apply(timed.event);
        }
        if pending.peek().is_none() && (synth.voices().is_empty() || block_start >= end_seconds) {
            break;
        }

        recorder.write_block(synth.render_block())?;
        blocks += 1;
        block_start += block_seconds;
    }
    synth.shutdown();
    debug!(
        "Rendered {} blocks ({:.2} s of audio)",
        blocks,
        synth.elapsed_seconds()
    );

    Ok(blocks)
}
