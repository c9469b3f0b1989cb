//! ADSR amplitude envelope.
//!
//! Stage timing is logical: every call to [`Envelope::advance`] carries the time step, and the
//! envelope never reads a clock. The stage-dependent target is a piecewise-linear ADSR shape, and
//! the audible amplitude is that target run through a one-pole smoother so stage changes,
//! retriggers and parameter changes never step the output.
//!
//! ```text
//!  1.0 ┐    ╱╲
//!      │   ╱  ╲_________
//!   S  │  ╱             ╲
//!  0.0 └─╱───────────────╲──→ t
//!        A   D     S      R
//! ```

use crate::filters::ExponentialSmoothing;

/// Shortest allowed stage. Zero, negative and NaN durations are clamped up to this.
pub const MIN_STAGE_SECONDS: f32 = 0.001;

/// Time constant of the amplitude smoother.
pub const SMOOTHING_SECONDS: f32 = 0.005;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdsrParams {
    pub attack: f32,
    pub decay: f32,
    /// Level, not a duration.
    pub sustain: f32,
    pub release: f32,
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.2,
        }
    }
}

impl AdsrParams {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Durations floored at [`MIN_STAGE_SECONDS`], sustain forced into `[0, 1]`.
    pub fn sanitized(self) -> Self {
        Self {
            attack: clamp_duration(self.attack),
            decay: clamp_duration(self.decay),
            // `max` first so a NaN sustain lands on 0.
            sustain: self.sustain.max(0.0).min(1.0),
            release: clamp_duration(self.release),
        }
    }
}

fn clamp_duration(seconds: f32) -> f32 {
    seconds.max(MIN_STAGE_SECONDS)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Clone, Debug)]
pub struct Envelope {
    stage: EnvelopeStage,
    stage_elapsed: f64,
    raw_target: f32,
    /// Smoothed amplitude captured when the release began.
    release_level: f32,
    smoother: ExponentialSmoothing,
    params: AdsrParams,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    pub fn new() -> Self {
        Self {
            stage: EnvelopeStage::Idle,
            stage_elapsed: 0.0,
            raw_target: 0.0,
            release_level: 0.0,
            smoother: ExponentialSmoothing::new(SMOOTHING_SECONDS),
            params: AdsrParams::default().sanitized(),
        }
    }

    /// Start (or restart) the attack with a snapshot of `params`.
    ///
    /// The current amplitude is left alone, so retriggering a sounding envelope ramps from where
    /// it is instead of dropping to zero.
    pub fn trigger(&mut self, params: AdsrParams) {
        self.params = params.sanitized();
        self.stage = EnvelopeStage::Attack;
        self.stage_elapsed = 0.0;
    }

    /// Enter the release from whatever stage is sounding. No-op when idle.
    pub fn release(&mut self) {
        if self.stage == EnvelopeStage::Idle {
            return;
        }
        self.release_level = self.smoother.value();
        self.stage = EnvelopeStage::Release;
        self.stage_elapsed = 0.0;
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// The smoothed output level in `[0, 1]`.
    pub fn amplitude(&self) -> f32 {
        self.smoother.value()
    }

    /// The unsmoothed ADSR shape value computed by the last `advance`.
    pub fn raw_target(&self) -> f32 {
        self.raw_target
    }

    pub fn params(&self) -> &AdsrParams {
        &self.params
    }

    /// Move the envelope forward by `dt` seconds and return the new amplitude.
    ///
    /// A step longer than a stage may cross several stage boundaries; the overshoot is carried
    /// into the next stage.
    pub fn advance(&mut self, dt: f32) -> f32 {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.stage_elapsed += f64::from(dt);

        let AdsrParams {
            attack,
            decay,
            sustain,
            release,
        } = self.params;
        loop {
            match self.stage {
                EnvelopeStage::Attack if self.stage_elapsed >= f64::from(attack) => {
                    self.stage_elapsed -= f64::from(attack);
                    self.stage = EnvelopeStage::Decay;
                }
                EnvelopeStage::Decay if self.stage_elapsed >= f64::from(decay) => {
                    self.stage_elapsed = 0.0;
                    self.stage = EnvelopeStage::Sustain;
                }
                EnvelopeStage::Release if self.stage_elapsed >= f64::from(release) => {
                    self.stage_elapsed = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
                _ => break,
            }
        }

        let elapsed = self.stage_elapsed as f32;
        self.raw_target = match self.stage {
            EnvelopeStage::Idle => 0.0,
            EnvelopeStage::Attack => (elapsed / attack).min(1.0),
            EnvelopeStage::Decay => 1.0 - (1.0 - sustain) * (elapsed / decay).min(1.0),
            EnvelopeStage::Sustain => sustain,
            EnvelopeStage::Release => self.release_level * (1.0 - (elapsed / release).min(1.0)),
        };

        if self.stage == EnvelopeStage::Idle {
            self.smoother.reset(0.0);
        } else {
            let level = self.smoother.apply(self.raw_target, dt);
            // A mix of two in-range values can still round one ulp outside the range.
            self.smoother.reset(level.max(0.0).min(1.0));
        }

        debug_assert!((0.0..=1.0).contains(&self.smoother.value()));
        self.smoother.value()
    }
}
