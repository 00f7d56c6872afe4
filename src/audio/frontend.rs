//! Per-channel spectral front end.
//!
//! The analyzer only depends on the [`SpectralFrontEnd`] trait; [`FftFrontEnd`]
//! is the default `rustfft` implementation.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{PhaseWheelError, Result};

/// Analyses per second when the caller has no preference.
pub const DEFAULT_REFRESH_HZ: f32 = 25.0;

/// Turns a stream of mono samples into per-bin power and phase.
pub trait SpectralFrontEnd: Send + Sized {
    /// Prepare an analysis of `fft_size` samples. `refresh_hz` bounds how
    /// often a new analysis completes.
    fn initialize(fft_size: usize, sample_rate: f32, refresh_hz: f32) -> Result<Self>;

    /// Feed samples. Returns true if a new full analysis completed.
    fn analyze(&mut self, samples: &[f32]) -> bool;

    /// Magnitude-squared per bin, `fft_size / 2` entries.
    fn power(&self) -> &[f32];

    /// Phase per bin in radians, (-π, π].
    fn phase(&self) -> &[f32];

    fn freq_per_bin(&self) -> f64;

    fn bins(&self) -> usize {
        self.power().len()
    }
}

pub struct FftFrontEnd {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    norm: f32,
    ring: Vec<f32>,
    write_pos: usize,
    samples_since_fft: usize,
    hop_size: usize,
    fft_buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    power: Vec<f32>,
    phase: Vec<f32>,
    freq_per_bin: f64,
}

impl SpectralFrontEnd for FftFrontEnd {
    fn initialize(fft_size: usize, sample_rate: f32, refresh_hz: f32) -> Result<Self> {
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(PhaseWheelError::FrontEnd(format!(
                "FFT size {} is not a power of two",
                fft_size
            )));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PhaseWheelError::FrontEnd(format!(
                "sample rate {} Hz",
                sample_rate
            )));
        }
        if !refresh_hz.is_finite() || refresh_hz <= 0.0 {
            return Err(PhaseWheelError::FrontEnd(format!(
                "refresh rate {} Hz",
                refresh_hz
            )));
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let window = hann_window(fft_size);
        let window_sum: f32 = window.iter().sum();
        let hop_size = ((sample_rate / refresh_hz) as usize).clamp(1, fft_size);
        let bins = fft_size / 2;

        log::debug!(
            "FFT front end: {} samples, hop {}, {:.2} Hz/bin",
            fft_size,
            hop_size,
            sample_rate as f64 / fft_size as f64
        );

        Ok(Self {
            fft,
            window,
            norm: 2.0 / window_sum,
            ring: vec![0.0; fft_size],
            write_pos: 0,
            samples_since_fft: 0,
            hop_size,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            power: vec![0.0; bins],
            phase: vec![0.0; bins],
            freq_per_bin: sample_rate as f64 / fft_size as f64,
        })
    }

    fn analyze(&mut self, samples: &[f32]) -> bool {
        let size = self.ring.len();
        for &sample in samples {
            self.ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % size;
        }
        self.samples_since_fft += samples.len();

        if self.samples_since_fft < self.hop_size {
            return false;
        }
        self.samples_since_fft %= self.hop_size;
        self.perform_fft();
        true
    }

    fn power(&self) -> &[f32] {
        &self.power
    }

    fn phase(&self) -> &[f32] {
        &self.phase
    }

    fn freq_per_bin(&self) -> f64 {
        self.freq_per_bin
    }
}

impl FftFrontEnd {
    fn perform_fft(&mut self) {
        let size = self.ring.len();
        // write_pos is the oldest sample
        for i in 0..size {
            let sample = self.ring[(self.write_pos + i) % size];
            self.fft_buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch);

        for (i, bin) in self.fft_buffer[..self.power.len()].iter().enumerate() {
            let scaled = *bin * self.norm;
            self.power[i] = scaled.norm_sqr();
            self.phase[i] = scaled.arg();
        }
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: f32, phase: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * freq * n as f32 / sample_rate + phase).sin())
            .collect()
    }

    #[test]
    fn rejects_bad_sizes() {
        assert!(FftFrontEnd::initialize(0, 48000.0, 25.0).is_err());
        assert!(FftFrontEnd::initialize(1000, 48000.0, 25.0).is_err());
        assert!(FftFrontEnd::initialize(1024, 0.0, 25.0).is_err());
        assert!(FftFrontEnd::initialize(1024, 48000.0, 0.0).is_err());
    }

    #[test]
    fn completes_once_per_hop() {
        // 48000 / 25 = 1920 samples, capped at the 1024-sample window
        let mut fe = FftFrontEnd::initialize(1024, 48000.0, 25.0).unwrap();
        assert_eq!(fe.bins(), 512);
        assert!(!fe.analyze(&[0.0; 1000]));
        assert!(fe.analyze(&[0.0; 24]));
        assert!(!fe.analyze(&[0.0; 10]));
    }

    #[test]
    fn full_scale_sine_reads_near_zero_db() {
        let rate = 48000.0;
        let size = 1024;
        let mut fe = FftFrontEnd::initialize(size, rate, 25.0).unwrap();
        // centre the tone on bin 64
        let freq = 64.0 * rate / size as f32;
        assert!(fe.analyze(&sine(freq, rate, 0.0, size)));

        let peak_bin = fe
            .power()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak_bin, 64);
        let db = 10.0 * fe.power()[64].log10();
        assert!(db.abs() < 0.5, "{} dB", db);
    }

    #[test]
    fn phase_offset_between_channels_is_preserved() {
        let rate = 48000.0;
        let size = 1024;
        let freq = 100.0 * rate / size as f32;
        let mut left = FftFrontEnd::initialize(size, rate, 25.0).unwrap();
        let mut right = FftFrontEnd::initialize(size, rate, 25.0).unwrap();
        left.analyze(&sine(freq, rate, 0.0, size));
        right.analyze(&sine(freq, rate, 0.5, size));

        let mut diff = right.phase()[100] - left.phase()[100];
        if diff > PI {
            diff -= 2.0 * PI;
        } else if diff < -PI {
            diff += 2.0 * PI;
        }
        assert!((diff - 0.5).abs() < 1e-2, "{}", diff);
    }

    #[test]
    fn silence_has_zero_power() {
        let mut fe = FftFrontEnd::initialize(256, 44100.0, 25.0).unwrap();
        assert!(fe.analyze(&[0.0; 256]));
        assert!(fe.power().iter().all(|&p| p == 0.0));
        assert!((fe.freq_per_bin() - 44100.0 / 256.0).abs() < 1e-9);
    }
}
