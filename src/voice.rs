use crate::{
    config::EnvelopeRate,
    envelope::{AdsrParams, Envelope},
    oscillator::Oscillator,
};

/// Size of the note keyspace; one voice slot per MIDI note number.
pub const NUM_NOTES: usize = 128;

/// Headroom applied to every voice before mixing.
pub const VOICE_GAIN: f32 = 0.5;

pub const ATTACK_CONTROLLER: u8 = 14;
pub const DECAY_CONTROLLER: u8 = 15;
pub const SUSTAIN_CONTROLLER: u8 = 16;
pub const RELEASE_CONTROLLER: u8 = 17;

/// Equal-tempered pitch with A4 (note 69) at 440 Hz.
pub fn note_hz(note: u8) -> f32 {
    440.0 * 2.0f32.powf((f32::from(note) - 69.0) / 12.0)
}

/// One sounding note.
#[derive(Clone, Debug)]
pub struct Voice {
    frequency: f32,
    velocity: f32,
    envelope: Envelope,
    oscillator: Oscillator,
    /// Not yet rendered since its note-on.
    fresh: bool,
    /// A note-off that arrived while `fresh`, applied once the first pass has run.
    pending_release: bool,
}

impl Voice {
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Normalized to `[0, 1]`.
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn oscillator(&self) -> &Oscillator {
        &self.oscillator
    }

    /// True while a note-off is waiting for this voice's first render pass.
    pub fn is_release_pending(&self) -> bool {
        self.pending_release
    }

    fn release(&mut self) {
        if self.fresh {
            self.pending_release = true;
        } else {
            self.envelope.release();
        }
    }

    /// Add this voice's next `mix.len()` samples into `mix`.
    ///
    /// With `bypass_envelope`, the envelope still runs (so the voice is eventually reaped) but a
    /// sounding voice plays at full level.
    pub fn render(
        &mut self,
        mix: &mut [f32],
        sample_dt: f32,
        envelope_rate: EnvelopeRate,
        bypass_envelope: bool,
    ) {
        let gain = self.velocity * VOICE_GAIN;
        match envelope_rate {
            EnvelopeRate::Block => {
                self.envelope.advance(sample_dt * mix.len() as f32);
                let amplitude = gain * self.level(bypass_envelope);
                for acc in mix.iter_mut() {
                    *acc += self.oscillator.next_sample(self.frequency, sample_dt) * amplitude;
                }
            }
            EnvelopeRate::Sample => {
                for acc in mix.iter_mut() {
                    self.envelope.advance(sample_dt);
                    let amplitude = gain * self.level(bypass_envelope);
                    *acc += self.oscillator.next_sample(self.frequency, sample_dt) * amplitude;
                }
            }
        }

        self.fresh = false;
        if self.pending_release {
            self.pending_release = false;
            self.envelope.release();
        }
    }

    fn level(&self, bypass_envelope: bool) -> f32 {
        match (bypass_envelope, self.envelope.is_active()) {
            (true, true) => 1.0,
            (true, false) => 0.0,
            (false, _) => self.envelope.amplitude(),
        }
    }
}

/// Owns every voice, one slot per note number.
pub struct VoiceManager {
    slots: Box<[Option<Voice>]>,
    num_active: usize,
    /// Parameters snapshotted by the next note-on.
    params: AdsrParams,
}

impl VoiceManager {
    pub fn new(params: AdsrParams) -> Self {
        Self {
            slots: (0..NUM_NOTES).map(|_| None).collect(),
            num_active: 0,
            params,
        }
    }

    pub fn params(&self) -> &AdsrParams {
        &self.params
    }

    pub fn num_active(&self) -> usize {
        self.num_active
    }

    pub fn is_empty(&self) -> bool {
        self.num_active == 0
    }

    pub fn get(&self, note: u8) -> Option<&Voice> {
        self.slots.get(usize::from(note)).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// Start a voice for `note`, replacing any voice already there. Notes outside the keyspace are
    /// ignored and velocities above 127 are clamped. Returns whether a voice was started.
    ///
    /// A replaced voice loses its phase, but its envelope level carries into the new attack.
    pub fn note_on(&mut self, note: u8, velocity: u8) -> bool {
        let slot = match self.slots.get_mut(usize::from(note)) {
            Some(slot) => slot,
            None => return false,
        };

        let mut envelope = match slot.take() {
            Some(previous) => previous.envelope,
            None => {
                self.num_active += 1;
                Envelope::new()
            }
        };
        envelope.trigger(self.params);

        *slot = Some(Voice {
            frequency: note_hz(note),
            velocity: f32::from(velocity.min(127)) / 127.0,
            envelope,
            oscillator: Oscillator::new(),
            fresh: true,
            pending_release: false,
        });

        true
    }

    /// Release the voice at `note`, if there is one.
    ///
    /// A voice that has not rendered yet holds the release until after its first pass, so a
    /// note-on and note-off landing in the same pass still sound.
    pub fn note_off(&mut self, note: u8) {
        if let Some(Some(voice)) = self.slots.get_mut(usize::from(note)) {
            voice.release();
        }
    }

    /// Update one ADSR field from a controller value in `0..=127`. Only notes started afterwards
    /// hear the change. Returns false for unmapped controllers.
    pub fn control_change(&mut self, controller: u8, value: u8) -> bool {
        let scaled = f32::from(value.min(127)) / 127.0;
        match controller {
            ATTACK_CONTROLLER => self.params.attack = scaled,
            DECAY_CONTROLLER => self.params.decay = scaled,
            SUSTAIN_CONTROLLER => self.params.sustain = scaled,
            RELEASE_CONTROLLER => self.params.release = scaled,
            _ => return false,
        }

        true
    }

    /// Drop every voice whose envelope has gone idle. Returns how many were removed.
    pub fn reap_finished(&mut self) -> usize {
        let mut reaped = 0;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().map_or(false, |v| !v.envelope.is_active()) {
                *slot = None;
                reaped += 1;
            }
        }
        self.num_active -= reaped;

        reaped
    }

    /// Discard every voice immediately, skipping release stages.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.num_active = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeStage;

    const SAMPLE_DT: f32 = 1.0 / 1000.0;

    fn render(manager: &mut VoiceManager, frames: usize) -> Vec<f32> {
        let mut mix = vec![0.0; frames];
        for voice in manager.iter_mut() {
            voice.render(&mut mix, SAMPLE_DT, EnvelopeRate::Sample, false);
        }
        mix
    }

    #[test]
    fn note_frequencies() {
        assert!((note_hz(69) - 440.0).abs() < 1e-3);
        assert!((note_hz(81) - 880.0).abs() < 1e-2);
        assert!((note_hz(60) - 261.626).abs() < 1e-2);
    }

    #[test]
    fn note_on_creates_voice() {
        let mut manager = VoiceManager::new(AdsrParams::default());
        assert!(manager.note_on(60, 127));

        let voice = manager.get(60).expect("voice for note 60");
        assert_eq!(voice.velocity(), 1.0);
        assert_eq!(voice.envelope().stage(), EnvelopeStage::Attack);
        assert_eq!(voice.oscillator().phase(), 0.0);
        assert_eq!(manager.num_active(), 1);
    }

    #[test]
    fn out_of_range_input_is_tamed() {
        let mut manager = VoiceManager::new(AdsrParams::default());
        assert!(!manager.note_on(128, 100));
        assert!(!manager.note_on(255, 100));
        manager.note_off(200);
        assert!(manager.is_empty());

        assert!(manager.note_on(10, 200));
        assert_eq!(manager.get(10).map(Voice::velocity), Some(1.0));
    }

    #[test]
    fn note_off_without_voice_is_noop() {
        let mut manager = VoiceManager::new(AdsrParams::default());
        manager.note_off(60);
        assert!(manager.is_empty());
    }

    #[test]
    fn same_note_retriggers_in_place() {
        let mut manager = VoiceManager::new(AdsrParams::default());
        manager.note_on(60, 100);
        render(&mut manager, 37);
        assert!(manager.get(60).map_or(0.0, |v| v.oscillator().phase()) > 0.0);

        manager.note_on(60, 50);
        assert_eq!(manager.num_active(), 1);
        let voice = manager.get(60).expect("retriggered voice");
        assert_eq!(voice.oscillator().phase(), 0.0);
        assert_eq!(voice.velocity(), 50.0 / 127.0);
        assert_eq!(voice.envelope().stage(), EnvelopeStage::Attack);
    }

    #[test]
    fn control_changes_only_affect_new_notes() {
        let mut manager = VoiceManager::new(AdsrParams::default());
        manager.note_on(60, 100);

        assert!(manager.control_change(SUSTAIN_CONTROLLER, 127));
        assert!(manager.control_change(ATTACK_CONTROLLER, 0));
        assert!(!manager.control_change(7, 64));
        assert_eq!(manager.params().sustain, 1.0);
        assert_eq!(manager.params().attack, 0.0);

        assert_eq!(manager.get(60).map(|v| v.envelope().params().sustain), Some(0.7));
        manager.note_on(62, 100);
        assert_eq!(manager.get(62).map(|v| v.envelope().params().sustain), Some(1.0));
    }

    #[test]
    fn released_voices_are_reaped_after_their_tail() {
        let mut manager = VoiceManager::new(AdsrParams::new(0.01, 0.01, 0.5, 0.05));
        manager.note_on(60, 100);
        manager.note_on(64, 100);
        render(&mut manager, 100);
        assert_eq!(manager.reap_finished(), 0);

        manager.note_off(60);
        render(&mut manager, 20);
        assert_eq!(manager.reap_finished(), 0);
        render(&mut manager, 40);
        assert_eq!(manager.reap_finished(), 1);
        assert!(manager.get(60).is_none());
        assert!(manager.get(64).is_some());
        assert_eq!(manager.num_active(), 1);
    }

    #[test]
    fn note_off_before_first_render_is_held_for_one_pass() {
        let mut manager = VoiceManager::new(AdsrParams::default());
        manager.note_on(60, 127);
        manager.note_off(60);
        let voice = manager.get(60).expect("voice for note 60");
        assert!(voice.is_release_pending());
        assert_eq!(voice.envelope().stage(), EnvelopeStage::Attack);

        let mix = render(&mut manager, 20);
        assert!(mix.iter().any(|&s| s != 0.0));
        let voice = manager.get(60).expect("voice for note 60");
        assert!(!voice.is_release_pending());
        assert_eq!(voice.envelope().stage(), EnvelopeStage::Release);
        assert!(voice.envelope().amplitude() > 0.0);
        assert_eq!(manager.reap_finished(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let mut manager = VoiceManager::new(AdsrParams::default());
        for note in 40..50 {
            manager.note_on(note, 90);
        }
        manager.clear();
        assert!(manager.is_empty());
        assert_eq!(manager.iter().count(), 0);
    }
}
