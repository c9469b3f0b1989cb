use std::f32::consts::TAU;

/// Advance a phase in radians by `dt` seconds at `frequency` Hz, wrapped into `[0, 2π)`.
pub fn advance_phase(phase: f32, frequency: f32, dt: f32) -> f32 {
    let next = (phase + TAU * frequency * dt).rem_euclid(TAU);
    // `rem_euclid` can round up to exactly TAU for tiny negative inputs.
    if next >= TAU {
        0.0
    } else {
        next
    }
}

/// Sine phase accumulator.
///
/// The phase is carried from block to block instead of being recomputed from an absolute time
/// index, so the waveform stays continuous when the frequency or the block length changes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Oscillator {
    phase: f32,
}

impl Oscillator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Waveform value at the current phase, in `[-1, 1]`.
    pub fn sample(&self) -> f32 {
        self.phase.sin()
    }

    pub fn advance(&mut self, frequency: f32, dt: f32) {
        self.phase = advance_phase(self.phase, frequency, dt);
    }

    /// Current sample, then step forward by `dt`.
    pub fn next_sample(&mut self, frequency: f32, dt: f32) -> f32 {
        let sample = self.sample();
        self.advance(frequency, dt);

        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circular_distance(a: f32, b: f32) -> f32 {
        let d = (a - b).abs() % TAU;
        d.min(TAU - d)
    }

    #[test]
    fn one_period_returns_to_start() {
        let sample_hz = 44_100.0;
        for &hz in &[441.0f32, 100.0, 2205.0] {
            let steps = (sample_hz / hz).round() as usize;
            let mut phase = 0.25;
            for _ in 0..steps {
                phase = advance_phase(phase, hz, 1.0 / sample_hz);
            }
            assert!(
                circular_distance(phase, 0.25) < 1e-3,
                "{} Hz drifted to {}",
                hz,
                phase
            );
        }
    }

    #[test]
    fn phase_stays_wrapped() {
        let mut osc = Oscillator::new();
        for _ in 0..100_000 {
            osc.advance(12_345.0, 1.0 / 44_100.0);
            assert!(osc.phase() >= 0.0 && osc.phase() < TAU);
        }
    }

    #[test]
    fn starts_at_zero_crossing() {
        let mut osc = Oscillator::new();
        assert_eq!(osc.next_sample(440.0, 1.0 / 44_100.0), 0.0);
        assert!(osc.sample() > 0.0);
    }

    #[test]
    fn block_split_does_not_change_waveform() {
        let dt = 1.0 / 48_000.0;
        let mut whole = Oscillator::new();
        let mut split = Oscillator::new();
        let whole_samples: Vec<f32> = (0..96).map(|_| whole.next_sample(330.0, dt)).collect();
        let mut split_samples: Vec<f32> = (0..40).map(|_| split.next_sample(330.0, dt)).collect();
        split_samples.extend((0..56).map(|_| split.next_sample(330.0, dt)));
        assert_eq!(whole_samples, split_samples);
    }
}
