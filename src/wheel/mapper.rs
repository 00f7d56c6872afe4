//! Polar placement of phase/level data on the wheel.
//!
//! Distance grows with frequency along a compressive log curve; phase 0
//! points to 12 o'clock and increases clockwise. Coordinates are offsets
//! from the wheel centre with y pointing down.

use serde::Serialize;

use super::resolution::LogScale;

/// Lowest calibration ring.
const GRID_START_HZ: f32 = 62.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateMapper {
    radius: f32,
    log_scale: LogScale,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GridRing {
    pub frequency: f32,
    pub distance: f32,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LevelTick {
    /// Position on the 60 dB scale, -60..=0.
    pub db: i32,
    pub label: String,
}

impl CoordinateMapper {
    pub fn new(radius: f32, log_scale: LogScale) -> Self {
        Self { radius, log_scale }
    }

    /// Distance for a normalized position `x` in [0, 1].
    pub fn distance(&self, x: f32) -> f32 {
        self.radius * self.log_scale.normalized(x)
    }

    /// Linear mode: position by bin index.
    pub fn bin_distance(&self, bin: usize, fft_bins: usize) -> f32 {
        self.distance(bin as f32 / fft_bins as f32)
    }

    /// Octave mode: position by frequency relative to Nyquist.
    pub fn frequency_distance(&self, frequency: f32, sample_rate: f32) -> f32 {
        self.distance(2.0 * frequency / sample_rate)
    }

    pub fn to_cartesian(&self, distance: f32, phase: f32) -> (f32, f32) {
        self.direction_to_cartesian(distance, [phase.sin(), phase.cos()])
    }

    /// Place a (sin, cos) phase vector at `distance`.
    pub fn direction_to_cartesian(&self, distance: f32, direction: [f32; 2]) -> (f32, f32) {
        (distance * direction[0], -distance * direction[1])
    }

    /// Calibration rings at 62.5 Hz and each octave above, below Nyquist.
    pub fn grid_rings(&self, sample_rate: f32) -> Vec<GridRing> {
        let mut rings = Vec::new();
        let mut freq = GRID_START_HZ;
        while freq < sample_rate / 2.0 {
            let label = if freq < 1000.0 {
                format!("{} Hz", freq.ceil() as u32)
            } else {
                format!("{} kHz", (freq / 1000.0).ceil() as u32)
            };
            rings.push(GridRing {
                frequency: freq,
                distance: self.frequency_distance(freq, sample_rate),
                label,
            });
            freq *= 2.0;
        }
        rings
    }
}

/// Level-scale annotations every 10 dB, shifted by the display gain.
pub fn level_ticks(gain_db: f32) -> Vec<LevelTick> {
    (-6..=0)
        .map(|step| {
            let db = step * 10;
            let shown = db as f32 - gain_db;
            let label = if db == 0 {
                format!("\u{2265}{:+.0}dB", shown)
            } else {
                format!("{:+.0}dB", shown)
            };
            LevelTick { db, label }
        })
        .collect()
}
