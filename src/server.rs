use crate::{
    audio_device::AudioOutputDeviceStream,
    config::EngineConfig,
    midi::{play_timeline, MidiFile, MidiInputDeviceStream},
    recording::{render_timeline, wav_sample_rate, WavRecorder},
    synthesizer::Synthesizer,
};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use std::path::Path;
use std::time::Duration;
use time_calc::Bpm;

/// Seconds rendered after the last event of a file so release tails are not cut off.
pub const FILE_TAIL_SECONDS: f64 = 2.0;

/// The main server that wires an event source through the synthesizer and into an output.
pub struct VesperServer {
    canceller: Receiver<()>,
    config: EngineConfig,
}

impl VesperServer {
    pub fn new(canceller: Receiver<()>, config: EngineConfig) -> Self {
        VesperServer { canceller, config }
    }

    /// The configuration with the sample rate replaced by the output device's.
    fn device_config(&self) -> Result<EngineConfig> {
        let device_hz = AudioOutputDeviceStream::default_sample_rate()? as f32;
        if device_hz != self.config.sample_rate {
            warn!(
                "Using the output device rate of {} Hz instead of {} Hz",
                device_hz, self.config.sample_rate
            );
        }

        Ok(EngineConfig {
            sample_rate: device_hz,
            ..self.config
        })
    }

    /// Play live MIDI input until cancelled.
    pub fn run_midi_device(&self, midi_input_port: usize) -> Result<()> {
        let (synth, sender) = Synthesizer::new(self.device_config()?)?;
        let midi_input = MidiInputDeviceStream::connect(midi_input_port, sender)?;
        let audio_output_stream = AudioOutputDeviceStream::connect_default(synth)?;

        audio_output_stream.play()?;
        info!(
            "Playing {} through the default output device",
            midi_input.port_name()
        );
        let _ = self.canceller.recv();
        debug!("Cancelling server operation");

        // Dropping the stream drops the synthesizer and every voice with it.
        drop(audio_output_stream);
        midi_input.close();

        Ok(())
    }

    /// Play a MIDI file in real time until it ends or is cancelled.
    pub fn run_midi_file(&self, path: &Path, bpm: Bpm) -> Result<()> {
        let timeline = MidiFile::read(path)?.timeline(bpm)?;
        let (synth, mut sender) = Synthesizer::new(self.device_config()?)?;
        let audio_output_stream = AudioOutputDeviceStream::connect_default(synth)?;

        audio_output_stream.play()?;
        info!("Playing {} ({} events)", path.display(), timeline.len());
        if play_timeline(&timeline, &mut sender, &self.canceller) {
            // Let release tails ring out unless cancelled.
            let _ = self
                .canceller
                .recv_timeout(Duration::from_secs_f64(FILE_TAIL_SECONDS));
        }
        debug!("Stopping file playback");

        Ok(())
    }

    /// Render a MIDI file to a WAV file without touching any device.
    pub fn render_midi_file(&self, midi_path: &Path, wav_path: &Path, bpm: Bpm) -> Result<()> {
        let timeline = MidiFile::read(midi_path)?.timeline(bpm)?;
        let wav_hz = wav_sample_rate(self.config.sample_rate)?;
        let (mut synth, _sender) = Synthesizer::new(self.config)?;
        let mut recorder = WavRecorder::create(wav_path, wav_hz)?;

        let blocks = render_timeline(&timeline, &mut synth, &mut recorder, FILE_TAIL_SECONDS)
            .with_context(|| format!("Failed to render {}", midi_path.display()))?;
        let frames = recorder.frames_written();
        recorder.finalize()?;
        info!(
            "Wrote {} blocks ({} frames) to {}",
            blocks,
            frames,
            wav_path.display()
        );

        Ok(())
    }
}
