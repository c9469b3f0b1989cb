use thiserror::Error;

/// Reasons the engine refuses to start.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("sample rate must be a positive number of Hz, got {0}")]
    InvalidSampleRate(f32),
    #[error("block size must be at least one frame, got {0}")]
    InvalidBlockSize(usize),
}
