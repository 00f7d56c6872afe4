use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "phasewheel", about = "Stereo phase wheel analysis of an audio file")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to phasewheel.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Half-spectrum size, rounded up to a power of two in 32..=4096
    #[arg(short, long, default_value_t = 512)]
    pub bins: usize,

    /// Display gain in dB (-40..=40)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub gain: f32,

    /// Lowest displayed level in dB (-59..=-10)
    #[arg(long, default_value_t = -59.0, allow_negative_numbers = true)]
    pub cutoff: f32,

    /// Aggregate into 1/N-octave bands
    #[arg(long)]
    pub octave: bool,

    /// Follow the peak envelope with the gain
    #[arg(long)]
    pub normalize: bool,

    /// Analyses per second
    #[arg(long, default_value_t = 25.0)]
    pub refresh: f32,

    /// Samples per processed block
    #[arg(long, default_value_t = 1024)]
    pub block_size: usize,

    /// Wheel radius used for coordinates
    #[arg(long, default_value_t = 160.0)]
    pub radius: f32,

    /// Include every published frame in the report
    #[arg(long)]
    pub frames: bool,

    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}
