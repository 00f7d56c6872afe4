use serde::Serialize;

use crate::error::{PhaseWheelError, Result};

/// Smallest half-spectrum size (64-sample FFT).
pub const MIN_FFT_BINS: usize = 32;
/// Largest half-spectrum size (8192-sample FFT).
pub const MAX_FFT_BINS: usize = 4096;

/// Octave bands are laid out around this frequency.
pub const REFERENCE_FREQ: f64 = 1000.0;

/// Below this bin count the band table uses 1/6 octave instead of 1/12.
const FINE_BANDS_MIN_BINS: usize = 128;

/// Round a requested bin count up to a power of two within
/// [`MIN_FFT_BINS`, `MAX_FFT_BINS`].
pub fn round_bins(requested: usize) -> usize {
    let mut n = requested.clamp(MIN_FFT_BINS, MAX_FFT_BINS) as u32;
    n -= 1;
    n |= n >> 1;
    n |= n >> 2;
    n |= n >> 4;
    n |= n >> 8;
    n |= n >> 16;
    (n + 1) as usize
}

pub fn bands_per_octave(fft_bins: usize) -> u32 {
    if fft_bins < FINE_BANDS_MIN_BINS {
        6
    } else {
        12
    }
}

/// Constants of the compressive radial mapping. They depend on the sample
/// rate only.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LogScale {
    pub rate: f32,
    pub base: f32,
}

impl LogScale {
    pub fn for_sample_rate(sample_rate: f32) -> Result<Self> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PhaseWheelError::InvalidSampleRate(sample_rate));
        }
        let knee = 2000.0 / sample_rate;
        let rate = (1.0 - 10000.0 / sample_rate) / (knee * knee);
        let base = (1.0 + rate).log10();
        // rates at or below 10 kHz fold the curve back on itself
        if !base.is_finite() || base <= 0.0 {
            return Err(PhaseWheelError::InvalidSampleRate(sample_rate));
        }
        Ok(Self { rate, base })
    }

    /// Map `x` in [0, 1] onto [0, 1] along the log curve.
    pub fn normalized(&self, x: f32) -> f32 {
        (1.0 + x * self.rate).log10() / self.base
    }
}

/// Bin-index boundaries of the 1/N-octave bands.
///
/// Each entry is the first bin of a new band; the last entry is always the
/// bin count itself. Bin 0 (DC) never belongs to a band.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BandTable {
    bounds: Vec<usize>,
}

impl BandTable {
    pub fn build(
        fft_bins: usize,
        freq_per_bin: f64,
        bands_per_octave: u32,
        sample_rate: f32,
    ) -> Result<Self> {
        let invalid = |reason: String| PhaseWheelError::InvalidBandTable {
            bins: fft_bins,
            sample_rate,
            reason,
        };

        if !(freq_per_bin > 0.0 && freq_per_bin < REFERENCE_FREQ) {
            return Err(invalid(format!(
                "bin width {:.1} Hz is not below the {} Hz reference",
                freq_per_bin, REFERENCE_FREQ
            )));
        }

        let b = bands_per_octave as f64;
        let f2f = 2f64.powf(1.0 / (2.0 * b));
        let lower = (b * (freq_per_bin / REFERENCE_FREQ).log2()).floor();
        let upper_edge = |band: i64| 2f64.powf((band as f64 + lower) / b) * REFERENCE_FREQ * f2f;

        let mut bounds = Vec::new();
        let mut band: i64 = 0;
        for i in 0..fft_bins {
            let freq = i as f64 * freq_per_bin;
            let mut edge = upper_edge(band);
            if edge > freq {
                continue;
            }
            while edge < freq {
                band += 1;
                edge = upper_edge(band);
            }
            bounds.push(i);
        }
        bounds.push(fft_bins);

        if bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("boundaries are not strictly increasing".into()));
        }

        Ok(Self { bounds })
    }

    pub fn bounds(&self) -> &[usize] {
        &self.bounds
    }

    /// Bin ranges of each band, starting at bin 1.
    pub fn ranges(&self) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        self.bounds.iter().scan(1usize, |start, &end| {
            let range = (*start).min(end)..end;
            *start = end;
            Some(range)
        })
    }
}

/// Everything derived from (requested bins, sample rate).
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub sample_rate: f32,
    pub fft_bins: usize,
    pub bands_per_octave: u32,
    pub freq_per_bin: f64,
    pub log_scale: LogScale,
    pub bands: BandTable,
}

impl Resolution {
    pub fn configure(requested_bins: usize, sample_rate: f32) -> Result<Self> {
        if requested_bins == 0 {
            return Err(PhaseWheelError::InvalidResolution(requested_bins));
        }
        let log_scale = LogScale::for_sample_rate(sample_rate)?;
        let fft_bins = round_bins(requested_bins);
        let bands_per_octave = bands_per_octave(fft_bins);
        let freq_per_bin = sample_rate as f64 / (2 * fft_bins) as f64;
        let bands = BandTable::build(fft_bins, freq_per_bin, bands_per_octave, sample_rate)?;

        log::debug!(
            "Resolution: requested {} -> {} bins @ {}Hz, 1/{} octave, {} bands",
            requested_bins,
            fft_bins,
            sample_rate,
            bands_per_octave,
            bands.bounds().len()
        );

        Ok(Self {
            sample_rate,
            fft_bins,
            bands_per_octave,
            freq_per_bin,
            log_scale,
            bands,
        })
    }

    /// FFT window length in samples.
    pub fn fft_size(&self) -> usize {
        self.fft_bins * 2
    }
}

/// Owns the active [`Resolution`]. A rejected reconfiguration leaves the
/// previous one in place.
#[derive(Clone, Debug)]
pub struct ResolutionManager {
    current: Resolution,
}

impl ResolutionManager {
    pub fn new(requested_bins: usize, sample_rate: f32) -> Result<Self> {
        Ok(Self {
            current: Resolution::configure(requested_bins, sample_rate)?,
        })
    }

    pub fn current(&self) -> &Resolution {
        &self.current
    }

    /// Derive a candidate without touching the active resolution.
    pub fn prepare(&self, requested_bins: usize, sample_rate: f32) -> Result<Resolution> {
        Resolution::configure(requested_bins, sample_rate).map_err(|e| {
            log::warn!(
                "Rejected reconfiguration ({} bins @ {}Hz), keeping {} bins @ {}Hz: {}",
                requested_bins,
                sample_rate,
                self.current.fft_bins,
                self.current.sample_rate,
                e
            );
            e
        })
    }

    pub fn commit(&mut self, resolution: Resolution) {
        self.current = resolution;
    }

    pub fn configure(&mut self, requested_bins: usize, sample_rate: f32) -> Result<&Resolution> {
        let next = self.prepare(requested_bins, sample_rate)?;
        self.commit(next);
        Ok(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_power_of_two_in_range() {
        let mut prev = 0;
        for r in 1..=100_000usize {
            let bins = round_bins(r);
            assert!(bins.is_power_of_two(), "{} -> {}", r, bins);
            assert!((MIN_FFT_BINS..=MAX_FFT_BINS).contains(&bins));
            assert!(bins >= prev);
            prev = bins;
        }
    }

    #[test]
    fn rounding_examples() {
        assert_eq!(round_bins(1), 32);
        assert_eq!(round_bins(33), 64);
        assert_eq!(round_bins(512), 512);
        assert_eq!(round_bins(513), 1024);
        assert_eq!(round_bins(6144), 4096);
    }

    #[test]
    fn chooses_coarse_bands_at_low_resolution() {
        assert_eq!(bands_per_octave(32), 6);
        assert_eq!(bands_per_octave(64), 6);
        assert_eq!(bands_per_octave(128), 12);
        assert_eq!(bands_per_octave(4096), 12);
    }

    #[test]
    fn log_scale_at_48k() {
        let scale = LogScale::for_sample_rate(48000.0).unwrap();
        let expected_rate = (1.0 - 10000.0 / 48000.0) / ((2000.0f32 / 48000.0).powi(2));
        assert!((scale.rate - expected_rate).abs() < 1e-2);
        assert!((scale.base - (1.0 + expected_rate).log10()).abs() < 1e-5);
        assert!(scale.normalized(0.0).abs() < 1e-6);
        assert!((scale.normalized(1.0) - 1.0).abs() < 1e-5);
        assert!(scale.normalized(0.1) > 0.1);
    }

    #[test]
    fn rejects_bad_sample_rates() {
        for rate in [0.0, -44100.0, f32::NAN, f32::INFINITY, 8000.0] {
            assert!(matches!(
                Resolution::configure(512, rate),
                Err(PhaseWheelError::InvalidSampleRate(_))
            ));
        }
    }

    #[test]
    fn rejects_zero_resolution() {
        assert_eq!(
            Resolution::configure(0, 48000.0),
            Err(PhaseWheelError::InvalidResolution(0))
        );
    }

    #[test]
    fn rejects_bins_wider_than_reference() {
        // 64-sample FFT at 96 kHz: 1500 Hz per bin
        let err = Resolution::configure(32, 96000.0).unwrap_err();
        assert!(matches!(err, PhaseWheelError::InvalidBandTable { .. }));
    }

    #[test]
    fn band_tables_are_strictly_increasing() {
        for rate in [22050.0, 44100.0, 48000.0, 88200.0, 96000.0, 192000.0] {
            for requested in [32, 64, 128, 256, 512, 1024, 2048, 4096] {
                let Ok(res) = Resolution::configure(requested, rate) else {
                    continue;
                };
                let bounds = res.bands.bounds();
                assert_eq!(*bounds.last().unwrap(), res.fft_bins);
                assert!(bounds[0] >= 1);
                assert!(bounds.windows(2).all(|w| w[0] < w[1]), "{} @ {}", requested, rate);
            }
        }
    }

    #[test]
    fn scenario_512_bins_at_48k() {
        let res = Resolution::configure(512, 48000.0).unwrap();
        assert_eq!(res.fft_bins, 512);
        assert_eq!(res.fft_size(), 1024);
        assert_eq!(res.bands_per_octave, 12);
        assert!((res.freq_per_bin - 46.875).abs() < 1e-9);

        // below ~800 Hz bins are wider than 1/12 octave, one band per bin
        let bounds = res.bands.bounds();
        assert_eq!(&bounds[..4], &[2, 3, 4, 5]);
        assert!(bounds.len() > 40 && bounds.len() < 120, "{}", bounds.len());

        let again = Resolution::configure(512, 48000.0).unwrap();
        assert_eq!(res, again);
    }

    #[test]
    fn ranges_cover_bins_from_one() {
        let res = Resolution::configure(256, 44100.0).unwrap();
        let ranges: Vec<_> = res.bands.ranges().collect();
        assert_eq!(ranges.len(), res.bands.bounds().len());
        assert_eq!(ranges[0].start, 1);
        assert_eq!(ranges.last().unwrap().end, 256);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn manager_keeps_previous_on_failure() {
        let mut manager = ResolutionManager::new(512, 48000.0).unwrap();
        let before = manager.current().clone();
        assert!(manager.configure(1024, -1.0).is_err());
        assert_eq!(manager.current(), &before);

        let next = manager.configure(1024, 44100.0).unwrap();
        assert_eq!(next.fft_bins, 1024);
        assert_eq!(next.sample_rate, 44100.0);
    }
}
