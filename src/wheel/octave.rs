//! 1/N-octave reduction of the per-bin snapshot.

use serde::Serialize;

use super::analyzer::{power_to_db, AnalysisSnapshot};
use super::mapper::CoordinateMapper;
use super::resolution::Resolution;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AggregatedBand {
    /// Mean frequency of the contributing bins, Hz.
    pub frequency: f32,
    pub radial_distance: f32,
    /// Circular mean of the contributing phases.
    pub angle: f32,
    /// Unit phase vector as (sin, cos). For a single bin this is the bin's
    /// own vector.
    pub direction: [f32; 2],
    pub level_db: f32,
    pub intensity: f32,
    pub bins: u32,
}

/// Map a dB level (after gain) onto 0..1 over the displayed 60 dB range.
pub fn intensity(level_db: f32) -> f32 {
    if level_db >= 0.0 {
        1.0
    } else {
        ((60.0 + level_db) / 60.0).clamp(0.0, 1.0)
    }
}

/// Reduce `snapshot` to one entry per non-empty band at or above `cutoff_db`.
///
/// `out` is cleared and refilled so callers can reuse its allocation.
pub fn aggregate(
    snapshot: &AnalysisSnapshot,
    resolution: &Resolution,
    gain_db: f32,
    cutoff_db: f32,
    mapper: &CoordinateMapper,
    out: &mut Vec<AggregatedBand>,
) {
    out.clear();
    let bins = snapshot.bins();
    let freq_per_bin = resolution.freq_per_bin;

    for range in resolution.bands.ranges() {
        let mut count = 0u32;
        let mut freq_sum = 0.0f64;
        let mut power_sum = 0.0f32;
        let (mut sin_sum, mut cos_sum) = (0.0f32, 0.0f32);

        for bin in range.start..range.end.min(bins) {
            if snapshot.is_silent(bin) {
                continue;
            }
            let phase = snapshot.phase[bin];
            count += 1;
            freq_sum += bin as f64 * freq_per_bin;
            power_sum += snapshot.level[bin];
            sin_sum += phase.sin();
            cos_sum += phase.cos();
        }

        if count == 0 {
            continue;
        }
        let level_db = gain_db + power_to_db(power_sum);
        if level_db < cutoff_db {
            continue;
        }

        let (angle, direction) = if count == 1 {
            (sin_sum.atan2(cos_sum), [sin_sum, cos_sum])
        } else {
            let angle = sin_sum.atan2(cos_sum);
            (angle, [angle.sin(), angle.cos()])
        };

        let frequency = (freq_sum / count as f64) as f32;
        out.push(AggregatedBand {
            frequency,
            radial_distance: mapper.frequency_distance(frequency, resolution.sample_rate),
            angle,
            direction,
            level_db,
            intensity: intensity(level_db),
            bins: count,
        });
    }
}
