//! Error types for the phase wheel analyzer.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhaseWheelError {
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(f32),

    #[error("Invalid resolution: {0} bins")]
    InvalidResolution(usize),

    #[error("Invalid octave band table ({bins} bins at {sample_rate} Hz): {reason}")]
    InvalidBandTable {
        bins: usize,
        sample_rate: f32,
        reason: String,
    },

    #[error("Cutoff {0} dB outside [-59, -10]")]
    InvalidCutoff(f32),

    #[error("Spectral front end: {0}")]
    FrontEnd(String),
}

pub type Result<T> = std::result::Result<T, PhaseWheelError>;
