/// Low-pass filter, AKA exponential smoothing. The discretized version of an RC low-pass filter.
///
/// The step size may change from call to call, so the coefficient is derived from a time constant
/// rather than fixed up front: `alpha = exp(-dt / tau)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExponentialSmoothing {
    smoothed_value: f32,
    time_constant: f32,

    // Cached so a constant step doesn't pay for `exp` every call.
    last_dt: f32,
    alpha: f32,
}

impl ExponentialSmoothing {
    pub fn new(time_constant: f32) -> Self {
        ExponentialSmoothing {
            smoothed_value: 0.0,
            time_constant,
            last_dt: 0.0,
            alpha: 1.0,
        }
    }

    pub fn apply(&mut self, target: f32, dt: f32) -> f32 {
        if dt != self.last_dt {
            self.last_dt = dt;
            self.alpha = (-dt.max(0.0) / self.time_constant).exp();
        }
        self.smoothed_value = self.alpha * self.smoothed_value + (1.0 - self.alpha) * target;

        self.smoothed_value
    }

    pub fn value(&self) -> f32 {
        self.smoothed_value
    }

    /// Jump straight to `value` with no smoothing.
    pub fn reset(&mut self, value: f32) {
        self.smoothed_value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_to_constant_target() {
        let mut filter = ExponentialSmoothing::new(0.005);
        for _ in 0..1000 {
            filter.apply(0.5, 0.001);
        }
        assert!((filter.value() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn one_time_constant_covers_most_of_the_gap() {
        let mut filter = ExponentialSmoothing::new(0.005);
        let value = filter.apply(1.0, 0.005);
        assert!((value - (1.0 - (-1.0f32).exp())).abs() < 1e-5);
    }

    #[test]
    fn zero_step_holds_value() {
        let mut filter = ExponentialSmoothing::new(0.005);
        filter.reset(0.3);
        assert_eq!(filter.apply(1.0, 0.0), 0.3);
    }
}
