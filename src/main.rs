mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use cli::Cli;
use phasewheel::audio::decode;
use phasewheel::audio::frontend::FftFrontEnd;
use phasewheel::config;
use phasewheel::wheel::analyzer::power_to_db;
use phasewheel::wheel::mapper::{level_ticks, GridRing, LevelTick};
use phasewheel::wheel::{AnalysisConfig, CoordinateMapper, PhaseAnalyzer, PlotPoint, WheelView};

#[derive(Serialize)]
struct Frame {
    generation: u64,
    time: f32,
    gain_db: f32,
    peak_envelope_db: f32,
    correlation: f32,
    points: Vec<PlotPoint>,
}

#[derive(Serialize)]
struct Report {
    input: String,
    duration: f32,
    config: AnalysisConfig,
    blocks: usize,
    published: u64,
    peak_envelope_db: f32,
    correlation: f32,
    correlation_meter: f32,
    grid: Vec<GridRing>,
    level_ticks: Vec<LevelTick>,
    points: Vec<PlotPoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    frames: Vec<Frame>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Config values apply only when the CLI flag is at its default
    let config_path = cli.config.clone().or_else(config::find_config);
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            if cli.bins == config::default_fft_bins() { cli.bins = cfg.analysis.fft_bins; }
            if cli.gain == 0.0 { cli.gain = cfg.analysis.gain_db; }
            if cli.cutoff == config::default_cutoff_db() { cli.cutoff = cfg.analysis.cutoff_db; }
            if !cli.octave { cli.octave = cfg.analysis.octave; }
            if !cli.normalize { cli.normalize = cfg.analysis.normalize; }
            if cli.refresh == config::default_refresh_hz() { cli.refresh = cfg.analysis.refresh_hz; }
            if cli.block_size == config::default_block_size() { cli.block_size = cfg.output.block_size; }
            if cli.radius == config::default_radius() { cli.radius = cfg.output.radius; }
            if !cli.pretty { cli.pretty = cfg.output.pretty; }
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }
    if cli.block_size == 0 {
        anyhow::bail!("Block size must be at least one sample");
    }

    log::info!("phasewheel - stereo phase analysis");
    log::info!("Input: {}", cli.input.display());

    // 1. Decode
    let audio = decode::decode_stereo(&cli.input)?;
    if audio.is_empty() {
        anyhow::bail!("No audio decoded from {}", cli.input.display());
    }
    let sample_rate = audio.sample_rate as f32;

    // 2. Analyzer
    let analyzer = PhaseAnalyzer::<FftFrontEnd>::with_refresh_rate(cli.bins, sample_rate, cli.refresh)
        .context("Failed to initialize phase analyzer")?;
    analyzer.set_gain_db(cli.gain);
    analyzer
        .set_cutoff_db(cli.cutoff)
        .context("Invalid cutoff")?;
    analyzer.set_octave_mode(cli.octave);
    analyzer.set_normalize_mode(cli.normalize);

    let config = analyzer.config();
    log::info!(
        "Analysis: {} bins, 1/{} octave, gain {:+.1} dB, cutoff {:.0} dB, {} mode",
        config.fft_bins,
        config.bands_per_octave,
        config.gain_db,
        config.cutoff_db,
        if config.octave_mode { "octave" } else { "linear" }
    );

    // 3. Stream blocks
    let total_blocks = audio.len().div_ceil(cli.block_size);
    let pb = ProgressBar::new(total_blocks as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} blocks ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let mut view = WheelView::new(cli.radius);
    let mut frames = Vec::new();
    let mut published = 0u64;

    for (idx, (left, right)) in audio.blocks(cli.block_size).enumerate() {
        if let Some(report) = analyzer.process(left, right) {
            published += 1;
            if let Some(gain) = report.gain_feedback {
                log::debug!("Normalized gain {:+.1} dB", gain);
            }
            view.refresh(&analyzer);
            if cli.frames {
                frames.push(Frame {
                    generation: view.generation(),
                    time: ((idx + 1) * cli.block_size) as f32 / sample_rate,
                    gain_db: analyzer.config().gain_db,
                    peak_envelope_db: power_to_db(view.peak_envelope()),
                    correlation: view.correlation(),
                    points: view.points().to_vec(),
                });
            }
        }
        pb.set_position(idx as u64 + 1);
    }
    pb.finish_with_message("Analysis complete");

    // 4. Report
    view.refresh(&analyzer);
    let config = analyzer.config();
    let resolution = analyzer.resolution();
    let mapper = CoordinateMapper::new(cli.radius, resolution.log_scale);
    let correlation = view.correlation();

    log::info!(
        "Published {} snapshots, {} points in final frame, correlation {:+.2}",
        published,
        view.points().len(),
        correlation
    );

    let report = Report {
        input: cli.input.display().to_string(),
        duration: audio.duration(),
        config,
        blocks: total_blocks,
        published,
        peak_envelope_db: power_to_db(view.peak_envelope()),
        correlation,
        correlation_meter: view.correlation_position(),
        grid: mapper.grid_rings(sample_rate),
        level_ticks: level_ticks(config.gain_db),
        points: view.points().to_vec(),
        frames,
    };

    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };

    match cli.output {
        Some(ref path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            log::info!("Done! Output: {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
