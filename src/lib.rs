//! Stereo phase-wheel analysis.
//!
//! Two channels of samples go in; a lock-guarded snapshot of per-bin phase
//! difference and level comes out, ready to be reduced to octave bands and
//! placed on a polar display.

pub mod audio;
pub mod config;
pub mod error;
pub mod wheel;

pub use error::{PhaseWheelError, Result};
