use crate::{
    config::{EngineConfig, EnvelopeRate},
    error::EngineError,
    event::{event_queue, EventSender, SynthEvent},
    voice::VoiceManager,
    Sample, NUM_CHANNELS,
};

use rtrb::Consumer;

/// Renders fixed-size blocks of interleaved stereo `i16` audio from the voices started by queued
/// events.
///
/// Event sources talk to it through the [`EventSender`] returned by [`Synthesizer::new`]; the
/// queue is drained at the top of every render pass, so no lock is ever held while sampling.
pub struct Synthesizer {
    sample_hz: f32,
    block_size: usize,
    envelope_rate: EnvelopeRate,
    envelope_bypass: bool,
    voices: VoiceManager,
    events: Consumer<SynthEvent>,

    // Scratch space, allocated once.
    mix: Vec<f32>,
    block: Vec<Sample>,

    blocks_rendered: u64,
    elapsed_seconds: f64,
}

impl Synthesizer {
    pub fn new(config: EngineConfig) -> Result<(Self, EventSender), EngineError> {
        config.validate()?;
        let (sender, events) = event_queue();

        let synth = Self {
            sample_hz: config.sample_rate,
            block_size: config.block_size,
            envelope_rate: config.envelope_rate,
            envelope_bypass: config.envelope_bypass,
            voices: VoiceManager::new(config.adsr),
            events,
            mix: vec![0.0; config.block_size],
            block: vec![0; config.block_size * NUM_CHANNELS],
            blocks_rendered: 0,
            elapsed_seconds: 0.0,
        };

        Ok((synth, sender))
    }

    pub fn sample_hz(&self) -> f32 {
        self.sample_hz
    }

    /// Frames per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_duration(&self) -> f32 {
        self.block_size as f32 / self.sample_hz
    }

    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    pub fn envelope_bypass(&self) -> bool {
        self.envelope_bypass
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered
    }

    /// Logical seconds of audio rendered so far.
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    /// Apply one event right away, bypassing the queue.
    pub fn apply(&mut self, event: SynthEvent) {
        match event {
            SynthEvent::NoteOn { note, velocity } => {
                self.voices.note_on(note, velocity);
            }
            SynthEvent::NoteOff { note } => self.voices.note_off(note),
            SynthEvent::ControlChange { controller, value } => {
                self.voices.control_change(controller, value);
            }
            SynthEvent::SetEnvelopeBypass(bypass) => self.envelope_bypass = bypass,
            SynthEvent::AllSoundOff => self.voices.clear(),
        }
    }

    /// Apply everything queued since the last pass. Bounded by the queue capacity.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events.pop() {
            self.apply(event);
        }
    }

    /// Render the next block: `block_size` frames of interleaved stereo.
    ///
    /// Always returns a full block; with nothing sounding it is silence.
    pub fn render_block(&mut self) -> &[Sample] {
        self.drain_events();

        if self.voices.is_empty() {
            for s in self.block.iter_mut() {
                *s = 0;
            }
        } else {
            self.mix_voices();
            self.voices.reap_finished();
        }

        self.blocks_rendered += 1;
        self.elapsed_seconds += f64::from(self.block_duration());

        &self.block
    }

    fn mix_voices(&mut self) {
        let sample_dt = 1.0 / self.sample_hz;
        for acc in self.mix.iter_mut() {
            *acc = 0.0;
        }
        for voice in self.voices.iter_mut() {
            voice.render(
                &mut self.mix,
                sample_dt,
                self.envelope_rate,
                self.envelope_bypass,
            );
        }

        let amplitude = f32::from(Sample::MAX);
        for (frame, acc) in self.block.chunks_exact_mut(NUM_CHANNELS).zip(self.mix.iter()) {
            // Hard clip: many voices in phase saturate rather than wrap.
            let sample = (acc.max(-1.0).min(1.0) * amplitude) as Sample;
            for s in frame.iter_mut() {
                *s = sample;
            }
        }
    }

    /// Discard every voice without running release stages.
    pub fn shutdown(&mut self) {
        self.drain_events();
        self.voices.clear();
    }
}
