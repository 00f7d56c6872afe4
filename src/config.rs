use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::frontend::DEFAULT_REFRESH_HZ;
use crate::wheel::analyzer::DEFAULT_CUTOFF_DB;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisSection {
    #[serde(default = "default_fft_bins")]
    pub fft_bins: usize,
    #[serde(default)]
    pub gain_db: f32,
    #[serde(default = "default_cutoff_db")]
    pub cutoff_db: f32,
    #[serde(default)]
    pub octave: bool,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: f32,
}

#[derive(Debug, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default = "default_radius")]
    pub radius: f32,
    #[serde(default)]
    pub pretty: bool,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            fft_bins: default_fft_bins(),
            gain_db: 0.0,
            cutoff_db: default_cutoff_db(),
            octave: false,
            normalize: false,
            refresh_hz: default_refresh_hz(),
        }
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            radius: default_radius(),
            pretty: false,
        }
    }
}

pub fn default_fft_bins() -> usize { 512 }
pub fn default_cutoff_db() -> f32 { DEFAULT_CUTOFF_DB }
pub fn default_refresh_hz() -> f32 { DEFAULT_REFRESH_HZ }
pub fn default_block_size() -> usize { 1024 }
pub fn default_radius() -> f32 { 160.0 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}

/// `./phasewheel.toml`, then `~/.config/phasewheel/config.toml`, then the
/// platform config dir.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("phasewheel.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("phasewheel").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("phasewheel").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
