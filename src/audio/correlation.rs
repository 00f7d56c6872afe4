//! Stereo phase-correlation meter shown beside the wheel.

/// Per-block smoothing of the correlation reading.
const SMOOTHING: f32 = 0.8;

#[derive(Clone, Debug)]
pub struct CorrelationMeter {
    correlation: f32,
}

impl Default for CorrelationMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationMeter {
    pub fn new() -> Self {
        // start at mono
        Self { correlation: 1.0 }
    }

    /// Fold one block of samples into the smoothed reading.
    pub fn process(&mut self, left: &[f32], right: &[f32]) -> f32 {
        let instant = correlate(left, right);
        self.correlation = SMOOTHING * self.correlation + (1.0 - SMOOTHING) * instant;
        self.correlation
    }

    /// Smoothed correlation, -1 (anti-phase) to +1 (mono).
    pub fn correlation(&self) -> f32 {
        self.correlation
    }

    pub fn reset(&mut self) {
        self.correlation = 1.0;
    }
}

/// Meter position for a correlation reading: 0 at the top (in phase), 1 at
/// the bottom (anti-phase).
pub fn meter_position(correlation: f32) -> f32 {
    0.5 * (1.0 - correlation.clamp(-1.0, 1.0))
}

/// Pearson correlation of two blocks; 0 when either side is silent.
pub fn correlate(left: &[f32], right: &[f32]) -> f32 {
    let (mut sum_lr, mut sum_l2, mut sum_r2) = (0.0f64, 0.0f64, 0.0f64);
    for (&l, &r) in left.iter().zip(right) {
        sum_lr += l as f64 * r as f64;
        sum_l2 += l as f64 * l as f64;
        sum_r2 += r as f64 * r as f64;
    }
    let denom = (sum_l2 * sum_r2).sqrt();
    if denom < 1e-12 {
        return 0.0;
    }
    (sum_lr / denom).clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.05).sin()).collect()
    }

    #[test]
    fn identical_channels_are_mono() {
        let l = tone(512);
        assert!((correlate(&l, &l) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn inverted_channel_is_anti_phase() {
        let l = tone(512);
        let r: Vec<f32> = l.iter().map(|s| -s).collect();
        assert!((correlate(&l, &r) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn silence_reads_zero() {
        assert_eq!(correlate(&[0.0; 64], &[0.0; 64]), 0.0);
        assert_eq!(correlate(&tone(64), &[0.0; 64]), 0.0);
    }

    #[test]
    fn meter_converges_towards_reading() {
        let l = tone(256);
        let r: Vec<f32> = l.iter().map(|s| -s).collect();
        let mut meter = CorrelationMeter::new();
        assert_eq!(meter_position(meter.correlation()), 0.0);
        for _ in 0..100 {
            meter.process(&l, &r);
        }
        assert!(meter.correlation() < -0.99);
        assert!(meter_position(meter.correlation()) > 0.99);
        meter.reset();
        assert_eq!(meter.correlation(), 1.0);
    }

    #[test]
    fn meter_position_spans_scale() {
        assert_eq!(meter_position(1.0), 0.0);
        assert_eq!(meter_position(0.0), 0.5);
        assert_eq!(meter_position(-1.0), 1.0);
    }
}
