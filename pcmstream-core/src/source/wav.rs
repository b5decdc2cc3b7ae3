//! WAV file source via `hound`.

use std::path::Path;

use tracing::info;

use crate::buffering::SampleBlock;
use crate::error::Result;

/// Layout of a decoded WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavLayout {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Load a WAV file and split its interleaved samples into blocks of
/// `block_frames` frames. Integer formats are scaled to [-1.0, 1.0].
///
/// The caller is responsible for checking that the layout matches the
/// stream; nothing here resamples or remixes.
pub fn read_wav_blocks(path: &Path, block_frames: usize) -> Result<(WavLayout, Vec<SampleBlock>)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let layout = WavLayout {
        sample_rate: spec.sample_rate,
        channels: spec.channels.max(1),
    };
    let block_len = block_frames.max(1) * layout.channels as usize;
    let blocks: Vec<SampleBlock> = interleaved.chunks(block_len).map(SampleBlock::from).collect();

    let seconds: f64 = blocks
        .iter()
        .map(|b| b.duration_secs(layout.sample_rate, layout.channels))
        .sum();

    info!(
        path = %path.display(),
        sample_rate = layout.sample_rate,
        channels = layout.channels,
        blocks = blocks.len(),
        seconds,
        "loaded WAV source"
    );

    Ok((layout, blocks))
}
