//! Dual-channel phase analyzer.
//!
//! One lock guards the snapshot arrays, the band table and the configuration.
//! The audio path (`process`) and reconfiguration always take the lock; the
//! render path uses [`PhaseAnalyzer::try_read`] and skips a frame when the
//! lock is busy.

use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use serde::Serialize;

use super::resolution::{round_bins, Resolution, ResolutionManager};
use crate::audio::correlation::CorrelationMeter;
use crate::audio::frontend::{FftFrontEnd, SpectralFrontEnd, DEFAULT_REFRESH_HZ};
use crate::error::{PhaseWheelError, Result};

/// Level marker for bins below the threshold. Real levels are powers and
/// never negative.
pub const SILENT_LEVEL: f32 = -100.0;

/// Per-block coefficient of the peak envelope.
pub const PEAK_SMOOTHING: f32 = 0.04;
const DENORMAL_GUARD: f32 = 1e-15;

pub const GAIN_RANGE: RangeInclusive<f32> = -40.0..=40.0;
pub const CUTOFF_RANGE: RangeInclusive<f32> = -59.0..=-10.0;
pub const DEFAULT_CUTOFF_DB: f32 = -59.0;

pub fn power_to_db(power: f32) -> f32 {
    if power > 1e-20 {
        10.0 * power.log10()
    } else {
        -200.0
    }
}

/// Minimum power for a bin to count, -60 dB below the gain.
pub fn power_threshold(gain_db: f32) -> f32 {
    let thresh = 10f32.powf(0.05 * (-60.0 - gain_db));
    thresh * thresh
}

/// Published phase difference and level per bin.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisSnapshot {
    /// Right minus left phase in radians; 0 for silent bins.
    pub phase: Vec<f32>,
    /// Max power of both channels, or [`SILENT_LEVEL`].
    pub level: Vec<f32>,
    /// Smoothed block peak (power).
    pub peak_envelope: f32,
    /// Smoothed stereo correlation, -1..+1.
    pub correlation: f32,
    /// Number of blocks published since the last reconfiguration.
    pub generation: u64,
}

impl AnalysisSnapshot {
    fn silent(bins: usize) -> Self {
        Self {
            phase: vec![0.0; bins],
            level: vec![SILENT_LEVEL; bins],
            peak_envelope: 0.0,
            correlation: 1.0,
            generation: 0,
        }
    }

    fn reset(&mut self, bins: usize) {
        self.phase.clear();
        self.phase.resize(bins, 0.0);
        self.level.clear();
        self.level.resize(bins, SILENT_LEVEL);
        self.peak_envelope = 0.0;
        self.correlation = 1.0;
        self.generation = 0;
    }

    pub fn bins(&self) -> usize {
        self.level.len()
    }

    pub fn is_silent(&self, bin: usize) -> bool {
        self.level[bin] < 0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AnalysisConfig {
    pub sample_rate: f32,
    pub fft_bins: usize,
    pub bands_per_octave: u32,
    pub gain_db: f32,
    pub cutoff_db: f32,
    pub octave_mode: bool,
    pub normalize: bool,
}

/// Returned by [`PhaseAnalyzer::process`] when a new snapshot was published.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockReport {
    /// Highest non-silent level of this block.
    pub peak: f32,
    pub peak_envelope: f32,
    pub generation: u64,
    /// New gain to push outward while normalize mode is on.
    pub gain_feedback: Option<f32>,
}

/// Borrowed state handed to readers while the lock is held.
pub struct AnalysisView<'a> {
    pub snapshot: &'a AnalysisSnapshot,
    pub resolution: &'a Resolution,
    pub config: AnalysisConfig,
}

#[derive(Clone, Copy, Debug)]
struct Controls {
    gain_db: f32,
    cutoff_db: f32,
    power_threshold: f32,
    octave_mode: bool,
    normalize: bool,
}

impl Controls {
    fn set_gain(&mut self, gain_db: f32) {
        self.gain_db = gain_db.clamp(*GAIN_RANGE.start(), *GAIN_RANGE.end());
        self.power_threshold = power_threshold(self.gain_db);
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            gain_db: 0.0,
            cutoff_db: DEFAULT_CUTOFF_DB,
            power_threshold: power_threshold(0.0),
            octave_mode: false,
            normalize: false,
        }
    }
}

struct State<F> {
    resolution: ResolutionManager,
    left: F,
    right: F,
    snapshot: AnalysisSnapshot,
    controls: Controls,
    correlation: CorrelationMeter,
}

impl<F> State<F> {
    fn config(&self) -> AnalysisConfig {
        let res = self.resolution.current();
        AnalysisConfig {
            sample_rate: res.sample_rate,
            fft_bins: res.fft_bins,
            bands_per_octave: res.bands_per_octave,
            gain_db: self.controls.gain_db,
            cutoff_db: self.controls.cutoff_db,
            octave_mode: self.controls.octave_mode,
            normalize: self.controls.normalize,
        }
    }

    fn view(&self) -> AnalysisView<'_> {
        AnalysisView {
            snapshot: &self.snapshot,
            resolution: self.resolution.current(),
            config: self.config(),
        }
    }
}

pub struct PhaseAnalyzer<F: SpectralFrontEnd = FftFrontEnd> {
    state: Mutex<State<F>>,
    refresh_hz: f32,
}

impl PhaseAnalyzer<FftFrontEnd> {
    pub fn new(requested_bins: usize, sample_rate: f32) -> Result<Self> {
        Self::with_refresh_rate(requested_bins, sample_rate, DEFAULT_REFRESH_HZ)
    }
}

impl<F: SpectralFrontEnd> PhaseAnalyzer<F> {
    /// Build an analyzer; both channel front ends must initialize.
    pub fn with_refresh_rate(requested_bins: usize, sample_rate: f32, refresh_hz: f32) -> Result<Self> {
        let resolution = ResolutionManager::new(requested_bins, sample_rate)?;
        let (left, right) = init_front_ends::<F>(resolution.current(), refresh_hz)?;
        let bins = resolution.current().fft_bins;

        log::info!(
            "Phase analyzer ready: {} bins @ {}Hz, {} octave bands",
            bins,
            sample_rate,
            resolution.current().bands.bounds().len()
        );

        Ok(Self {
            state: Mutex::new(State {
                resolution,
                left,
                right,
                snapshot: AnalysisSnapshot::silent(bins),
                controls: Controls::default(),
                correlation: CorrelationMeter::new(),
            }),
            refresh_hz,
        })
    }

    fn lock(&self) -> MutexGuard<'_, State<F>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Analyse one stereo block.
    ///
    /// Returns a report only when both channels completed a new analysis
    /// and the snapshot was rewritten.
    pub fn process(&self, left: &[f32], right: &[f32]) -> Option<BlockReport> {
        let mut guard = self.lock();
        let state = &mut *guard;

        state.snapshot.correlation = state.correlation.process(left, right);

        state.left.analyze(left);
        if !state.right.analyze(right) {
            return None;
        }

        let bins = state.resolution.current().fft_bins;
        let threshold = state.controls.power_threshold;
        let (power_l, phase_l) = (state.left.power(), state.left.phase());
        let (power_r, phase_r) = (state.right.power(), state.right.phase());
        let snapshot = &mut state.snapshot;

        let mut peak = 0.0f32;
        // DC and the top bin carry no usable phase
        for i in 1..bins.saturating_sub(1) {
            if power_l[i] < threshold || power_r[i] < threshold {
                snapshot.phase[i] = 0.0;
                snapshot.level[i] = SILENT_LEVEL;
                continue;
            }
            snapshot.phase[i] = phase_r[i] - phase_l[i];
            let level = power_l[i].max(power_r[i]);
            snapshot.level[i] = level;
            peak = peak.max(level);
        }

        snapshot.peak_envelope += PEAK_SMOOTHING * (peak - snapshot.peak_envelope) + DENORMAL_GUARD;
        snapshot.generation += 1;

        let gain_feedback = if state.controls.normalize {
            state.controls.set_gain(-power_to_db(snapshot.peak_envelope));
            Some(state.controls.gain_db)
        } else {
            None
        };

        log::trace!(
            "Block {}: peak {:.1} dB, envelope {:.1} dB",
            snapshot.generation,
            power_to_db(peak),
            power_to_db(snapshot.peak_envelope)
        );

        Some(BlockReport {
            peak,
            peak_envelope: snapshot.peak_envelope,
            generation: snapshot.generation,
            gain_feedback,
        })
    }

    /// Non-blocking read for the render path. `None` if the lock is busy.
    pub fn try_read<R>(&self, f: impl FnOnce(AnalysisView<'_>) -> R) -> Option<R> {
        let guard = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(f(guard.view()))
    }

    /// Blocking read.
    pub fn read<R>(&self, f: impl FnOnce(AnalysisView<'_>) -> R) -> R {
        f(self.lock().view())
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        self.read(|view| view.snapshot.clone())
    }

    pub fn resolution(&self) -> Resolution {
        self.read(|view| view.resolution.clone())
    }

    pub fn config(&self) -> AnalysisConfig {
        self.lock().config()
    }

    pub fn peak_envelope(&self) -> f32 {
        self.lock().snapshot.peak_envelope
    }

    /// Change the bin count. Same-size requests are a no-op.
    pub fn set_resolution(&self, requested_bins: usize) -> Result<AnalysisConfig> {
        let mut state = self.lock();
        let current = state.resolution.current();
        if requested_bins > 0 && round_bins(requested_bins) == current.fft_bins {
            return Ok(state.config());
        }
        let sample_rate = current.sample_rate;
        self.reconfigure(&mut state, requested_bins, sample_rate)
    }

    pub fn set_sample_rate(&self, sample_rate: f32) -> Result<AnalysisConfig> {
        let mut state = self.lock();
        let bins = state.resolution.current().fft_bins;
        self.reconfigure(&mut state, bins, sample_rate)
    }

    // Everything is derived before anything is replaced, so a failure
    // leaves the old configuration intact.
    fn reconfigure(
        &self,
        state: &mut State<F>,
        requested_bins: usize,
        sample_rate: f32,
    ) -> Result<AnalysisConfig> {
        let next = state.resolution.prepare(requested_bins, sample_rate)?;
        let (left, right) = init_front_ends::<F>(&next, self.refresh_hz)?;

        state.left = left;
        state.right = right;
        state.snapshot.reset(next.fft_bins);
        state.correlation.reset();
        log::info!(
            "Reconfigured: {} bins @ {}Hz, 1/{} octave, {} bands",
            next.fft_bins,
            next.sample_rate,
            next.bands_per_octave,
            next.bands.bounds().len()
        );
        state.resolution.commit(next);
        Ok(state.config())
    }

    /// Set the display gain (clamped to ±40 dB). Returns the applied value.
    pub fn set_gain_db(&self, gain_db: f32) -> f32 {
        let mut state = self.lock();
        if gain_db.is_finite() {
            state.controls.set_gain(gain_db);
        } else {
            log::warn!("Ignoring non-finite gain {}", gain_db);
        }
        state.controls.gain_db
    }

    pub fn set_cutoff_db(&self, cutoff_db: f32) -> Result<f32> {
        if !CUTOFF_RANGE.contains(&cutoff_db) {
            log::warn!("Ignoring cutoff {} dB", cutoff_db);
            return Err(PhaseWheelError::InvalidCutoff(cutoff_db));
        }
        self.lock().controls.cutoff_db = cutoff_db;
        Ok(cutoff_db)
    }

    pub fn set_octave_mode(&self, enabled: bool) {
        self.lock().controls.octave_mode = enabled;
    }

    pub fn set_normalize_mode(&self, enabled: bool) {
        self.lock().controls.normalize = enabled;
    }
}

fn init_front_ends<F: SpectralFrontEnd>(resolution: &Resolution, refresh_hz: f32) -> Result<(F, F)> {
    let init = || -> Result<F> {
        let front_end = F::initialize(resolution.fft_size(), resolution.sample_rate, refresh_hz)?;
        if front_end.bins() != resolution.fft_bins {
            return Err(PhaseWheelError::FrontEnd(format!(
                "front end reports {} bins, expected {}",
                front_end.bins(),
                resolution.fft_bins
            )));
        }
        // bin frequencies in the band table must match the analysis
        let spacing = front_end.freq_per_bin();
        if (spacing - resolution.freq_per_bin).abs() > 1e-6 * resolution.freq_per_bin {
            return Err(PhaseWheelError::FrontEnd(format!(
                "front end reports {:.4} Hz/bin, expected {:.4}",
                spacing, resolution.freq_per_bin
            )));
        }
        Ok(front_end)
    };
    Ok((init()?, init()?))
}
