use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

pub struct StereoAudio {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoAudio {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }

    /// Iterate over aligned (left, right) blocks of at most `block_size`.
    pub fn blocks(&self, block_size: usize) -> impl Iterator<Item = (&[f32], &[f32])> + '_ {
        let block_size = block_size.max(1);
        self.left.chunks(block_size).zip(self.right.chunks(block_size))
    }
}

/// Decode an audio file into separate left/right channels. Mono is
/// duplicated; channels beyond the second are dropped.
pub fn decode_stereo(path: &Path) -> Result<StereoAudio> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut left: Vec<f32> = Vec::new();
    let mut right: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        split_interleaved(sample_buf.samples(), channels, &mut left, &mut right);
    }

    if channels == 1 {
        log::info!("Mono input, analysing identical channels");
    } else if channels > 2 {
        log::warn!("{} channels, using the first two", channels);
    }
    log::info!(
        "Decoded audio: {} frames, {}Hz, {:.1}s",
        left.len(),
        sample_rate,
        left.len() as f32 / sample_rate as f32
    );

    Ok(StereoAudio {
        left,
        right,
        sample_rate,
    })
}

fn split_interleaved(samples: &[f32], channels: usize, left: &mut Vec<f32>, right: &mut Vec<f32>) {
    if channels <= 1 {
        left.extend_from_slice(samples);
        right.extend_from_slice(samples);
        return;
    }
    for frame in samples.chunks_exact(channels) {
        left.push(frame[0]);
        right.push(frame[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_stereo_and_drops_extra_channels() {
        let (mut l, mut r) = (Vec::new(), Vec::new());
        split_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, &mut l, &mut r);
        assert_eq!(l, vec![1.0, 4.0]);
        assert_eq!(r, vec![2.0, 5.0]);
    }

    #[test]
    fn duplicates_mono() {
        let (mut l, mut r) = (Vec::new(), Vec::new());
        split_interleaved(&[0.5, -0.5], 1, &mut l, &mut r);
        assert_eq!(l, r);
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn blocks_stay_aligned() {
        let audio = StereoAudio {
            left: (0..10).map(|i| i as f32).collect(),
            right: (0..10).map(|i| -(i as f32)).collect(),
            sample_rate: 48000,
        };
        let blocks: Vec<_> = audio.blocks(4).collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].0, &[8.0, 9.0]);
        assert_eq!(blocks[2].1, &[-8.0, -9.0]);
    }
}
