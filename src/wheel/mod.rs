//! Stereo phase wheel: per-bin phase difference and level, optional
//! 1/N-octave reduction, and polar display mapping.

pub mod analyzer;
pub mod mapper;
pub mod octave;
pub mod resolution;
pub mod view;

pub use analyzer::{AnalysisConfig, AnalysisSnapshot, BlockReport, PhaseAnalyzer};
pub use mapper::CoordinateMapper;
pub use octave::AggregatedBand;
pub use resolution::{BandTable, LogScale, Resolution, ResolutionManager};
pub use view::{Freshness, PlotPoint, WheelView};
