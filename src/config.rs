use crate::{envelope::AdsrParams, error::EngineError};

use std::str::FromStr;

pub const DEFAULT_SAMPLE_RATE: f32 = 44_100.0;
pub const DEFAULT_BLOCK_SIZE: usize = 2048;

/// How often each voice's envelope is advanced while rendering a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeRate {
    /// Once per output sample. Smooth, costs one envelope step per sample per voice.
    Sample,
    /// Once per block; the amplitude is held for the whole block.
    Block,
}

impl Default for EnvelopeRate {
    fn default() -> Self {
        EnvelopeRate::Sample
    }
}

impl FromStr for EnvelopeRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sample" => Ok(EnvelopeRate::Sample),
            "block" => Ok(EnvelopeRate::Block),
            other => Err(format!("unknown envelope rate {:?} (expected sample or block)", other)),
        }
    }
}

/// Everything fixed at engine construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: f32,
    /// Frames per rendered block.
    pub block_size: usize,
    /// ADSR values in effect before any control change arrives.
    pub adsr: AdsrParams,
    pub envelope_rate: EnvelopeRate,
    pub envelope_bypass: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            adsr: AdsrParams::default(),
            envelope_rate: EnvelopeRate::default(),
            envelope_bypass: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(EngineError::InvalidSampleRate(self.sample_rate));
        }
        if self.block_size == 0 {
            return Err(EngineError::InvalidBlockSize(self.block_size));
        }

        Ok(())
    }

    /// Seconds of audio in one block. This is also the worst-case latency between an event and
    /// its audible effect.
    pub fn block_duration(&self) -> f32 {
        self.block_size as f32 / self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert!((config.block_duration() - 2048.0 / 44_100.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_sample_rates() {
        for rate in &[0.0, -44_100.0, f32::NAN, f32::INFINITY] {
            let config = EngineConfig {
                sample_rate: *rate,
                ..EngineConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(EngineError::InvalidSampleRate(_))
            ));
        }
    }

    #[test]
    fn rejects_empty_blocks() {
        let config = EngineConfig {
            block_size: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(EngineError::InvalidBlockSize(0)));
    }

    #[test]
    fn parses_envelope_rate() {
        assert_eq!("block".parse::<EnvelopeRate>(), Ok(EnvelopeRate::Block));
        assert_eq!("sample".parse::<EnvelopeRate>(), Ok(EnvelopeRate::Sample));
        assert!("tick".parse::<EnvelopeRate>().is_err());
    }
}
