//! Render-side frame builder.
//!
//! [`WheelView::refresh`] is called once per display tick. It never waits
//! on the audio path: when the analyzer lock is busy the previous frame is
//! kept.

use serde::Serialize;

use super::analyzer::{power_to_db, AnalysisView, PhaseAnalyzer};
use super::mapper::CoordinateMapper;
use super::octave::{aggregate, intensity, AggregatedBand};
use crate::audio::correlation::meter_position;
use crate::audio::frontend::SpectralFrontEnd;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PlotPoint {
    pub x: f32,
    pub y: f32,
    pub distance: f32,
    pub phase: f32,
    pub frequency: f32,
    pub level_db: f32,
    pub intensity: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

#[derive(Debug)]
pub struct WheelView {
    radius: f32,
    points: Vec<PlotPoint>,
    bands: Vec<AggregatedBand>,
    generation: u64,
    correlation: f32,
    peak_envelope: f32,
    stale_frames: u64,
}

impl WheelView {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            points: Vec::new(),
            bands: Vec::new(),
            generation: 0,
            correlation: 1.0,
            peak_envelope: 0.0,
            stale_frames: 0,
        }
    }

    /// Rebuild the frame if the analyzer is free, otherwise keep the last one.
    pub fn refresh<F: SpectralFrontEnd>(&mut self, analyzer: &PhaseAnalyzer<F>) -> Freshness {
        match analyzer.try_read(|view| self.rebuild(view)) {
            Some(()) => Freshness::Fresh,
            None => {
                self.stale_frames += 1;
                Freshness::Stale
            }
        }
    }

    fn rebuild(&mut self, view: AnalysisView<'_>) {
        let res = view.resolution;
        let config = view.config;
        let snapshot = view.snapshot;
        let mapper = CoordinateMapper::new(self.radius, res.log_scale);

        self.points.clear();
        self.bands.clear();
        self.generation = snapshot.generation;
        self.correlation = snapshot.correlation;
        self.peak_envelope = snapshot.peak_envelope;

        if config.octave_mode {
            aggregate(snapshot, res, config.gain_db, config.cutoff_db, &mapper, &mut self.bands);
            self.points.extend(self.bands.iter().map(|band| {
                let (x, y) = mapper.direction_to_cartesian(band.radial_distance, band.direction);
                PlotPoint {
                    x,
                    y,
                    distance: band.radial_distance,
                    phase: band.angle,
                    frequency: band.frequency,
                    level_db: band.level_db,
                    intensity: band.intensity,
                }
            }));
            return;
        }

        let bins = snapshot.bins();
        for bin in 1..bins.saturating_sub(1) {
            if snapshot.is_silent(bin) {
                continue;
            }
            let level_db = config.gain_db + power_to_db(snapshot.level[bin]);
            if level_db < config.cutoff_db {
                continue;
            }
            let phase = snapshot.phase[bin];
            let distance = mapper.bin_distance(bin, bins);
            let (x, y) = mapper.to_cartesian(distance, phase);
            self.points.push(PlotPoint {
                x,
                y,
                distance,
                phase,
                frequency: (bin as f64 * res.freq_per_bin) as f32,
                level_db,
                intensity: intensity(level_db),
            });
        }
    }

    pub fn points(&self) -> &[PlotPoint] {
        &self.points
    }

    /// Aggregated bands of the last octave-mode frame.
    pub fn bands(&self) -> &[AggregatedBand] {
        &self.bands
    }

    /// Snapshot generation the current frame was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn correlation(&self) -> f32 {
        self.correlation
    }

    /// Correlation meter needle, 0 (in phase) to 1 (anti-phase).
    pub fn correlation_position(&self) -> f32 {
        meter_position(self.correlation)
    }

    pub fn peak_envelope(&self) -> f32 {
        self.peak_envelope
    }

    pub fn stale_frames(&self) -> u64 {
        self.stale_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wheel::analyzer::tests::pass_through;
    use std::sync::mpsc;

    #[test]
    fn linear_mode_plots_every_loud_bin() {
        let analyzer = pass_through(64);
        analyzer.process(&[1.0, 0.0], &[1.0, 0.0]).unwrap();

        let mut view = WheelView::new(160.0);
        assert_eq!(view.refresh(&analyzer), Freshness::Fresh);
        assert_eq!(view.points().len(), 62);
        assert_eq!(view.generation(), 1);

        let first = view.points()[0];
        assert!(first.x.abs() < 1e-5);
        assert!(first.y < 0.0);
        assert_eq!(first.intensity, 1.0);
        assert!(view.points().windows(2).all(|w| w[0].distance < w[1].distance));
    }

    #[test]
    fn octave_mode_plots_bands() {
        let analyzer = pass_through(512);
        analyzer.set_octave_mode(true);
        analyzer.process(&[1e-3, 0.0], &[1e-3, 1.0]).unwrap();

        let mut view = WheelView::new(160.0);
        view.refresh(&analyzer);
        let bands = analyzer.resolution().bands.bounds().len();
        // the band holding only the top bin stays empty
        assert!(view.points().len() >= bands - 1 && view.points().len() <= bands);
        assert_eq!(view.points().len(), view.bands().len());
        for p in view.points() {
            assert!((p.phase - 1.0).abs() < 1e-4);
            assert!(p.distance <= 160.0);
        }
    }

    #[test]
    fn cutoff_hides_quiet_bins() {
        let analyzer = pass_through(64);
        // -50 dB
        analyzer.process(&[1e-5, 0.0], &[1e-5, 0.0]).unwrap();
        let mut view = WheelView::new(160.0);
        view.refresh(&analyzer);
        assert_eq!(view.points().len(), 62);

        analyzer.set_cutoff_db(-40.0).unwrap();
        view.refresh(&analyzer);
        assert!(view.points().is_empty());
    }

    #[test]
    fn correlation_needle_follows_snapshot() {
        let analyzer = pass_through(64);
        let mut view = WheelView::new(160.0);
        view.refresh(&analyzer);
        assert_eq!(view.correlation_position(), 0.0);

        // one anti-phase block: 0.8 * 1 + 0.2 * -1
        analyzer.process(&[1.0, 0.5], &[-1.0, -0.5]).unwrap();
        view.refresh(&analyzer);
        assert!((view.correlation() - 0.6).abs() < 1e-6);
        assert!((view.correlation_position() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn keeps_previous_frame_when_locked() {
        let analyzer = pass_through(64);
        analyzer.process(&[1.0, 0.0], &[1.0, 0.5]).unwrap();
        let mut view = WheelView::new(100.0);
        view.refresh(&analyzer);
        let before = view.points().to_vec();

        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let shared = &analyzer;
        std::thread::scope(|scope| {
            scope.spawn(move || {
                shared.read(|_| {
                    locked_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                });
            });
            locked_rx.recv().unwrap();
            assert_eq!(view.refresh(&analyzer), Freshness::Stale);
            release_tx.send(()).unwrap();
        });

        assert_eq!(view.points(), before.as_slice());
        assert_eq!(view.stale_frames(), 1);
        assert_eq!(view.refresh(&analyzer), Freshness::Fresh);
    }
}
