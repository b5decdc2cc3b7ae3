//! Feeds a `PcmStream` from whatever source the settings name.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context};
use pcmstream_core::{
    source::{pipe::PipeSource, wav::read_wav_blocks, ChunkReader},
    PcmStream, SampleBlock,
};
use tracing::{info, warn};

use crate::settings::AppSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Stdin,
    Wav(PathBuf),
    Pipe(PathBuf),
}

pub fn classify_source(raw: &str) -> SourceKind {
    if raw == "-" {
        return SourceKind::Stdin;
    }
    let path = PathBuf::from(raw);
    let is_wav = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);
    if is_wav {
        SourceKind::Wav(path)
    } else {
        SourceKind::Pipe(path)
    }
}

/// Read the configured source until it ends or `running` clears, enqueueing
/// every block. Returns the number of blocks enqueued.
pub fn run_source(
    settings: &AppSettings,
    stream: &PcmStream,
    running: &AtomicBool,
) -> anyhow::Result<usize> {
    let mut enqueued = 0usize;
    let mut feed = |block: SampleBlock| {
        match stream.enqueue(block) {
            Ok(_) => enqueued += 1,
            Err(e) => {
                warn!("enqueue rejected, stopping source: {e}");
                running.store(false, Ordering::Relaxed);
            }
        }
    };

    match classify_source(&settings.source_path) {
        SourceKind::Stdin => {
            info!(format = %settings.sample_format, "reading PCM from stdin");
            let reader = ChunkReader::new(io::stdin().lock(), settings.sample_format, settings.chunk_bytes);
            for block in reader {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                feed(block.context("stdin read failed")?);
            }
        }
        SourceKind::Wav(path) => {
            let frames = settings.chunk_bytes / settings.sample_format.bytes_per_sample();
            let (layout, blocks) = read_wav_blocks(&path, frames)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if layout.sample_rate != settings.sample_rate || layout.channels != settings.channels {
                bail!(
                    "{} is {} Hz / {} ch but the stream is {} Hz / {} ch",
                    path.display(),
                    layout.sample_rate,
                    layout.channels,
                    settings.sample_rate,
                    settings.channels
                );
            }
            for block in blocks {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                feed(block);
            }
        }
        SourceKind::Pipe(path) => {
            let mut source = PipeSource::new(path, settings.sample_format);
            source.chunk_bytes = settings.chunk_bytes;
            source.reopen_backoff = settings.reopen_backoff();
            source.missing_backoff = settings.missing_source_backoff();
            info!(
                path = %source.path.display(),
                follow = source.follow,
                format = %source.format,
                "reading PCM from path"
            );
            source.run(running, &mut feed)?;
        }
    }

    Ok(enqueued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcmstream_core::{PcmFormat, StreamConfig};

    #[test]
    fn classifies_sources() {
        assert_eq!(classify_source("-"), SourceKind::Stdin);
        assert_eq!(
            classify_source("take.WAV"),
            SourceKind::Wav(PathBuf::from("take.WAV"))
        );
        assert_eq!(
            classify_source("/config/pcspk_audio/pcspk_out.raw"),
            SourceKind::Pipe(PathBuf::from("/config/pcspk_audio/pcspk_out.raw"))
        );
    }

    #[test]
    fn raw_file_is_enqueued_in_order() {
        let path = std::env::temp_dir().join(format!("pcmstream-player-{}.raw", std::process::id()));
        let bytes: Vec<u8> = (0..200u8).collect();
        std::fs::write(&path, &bytes).unwrap();

        let settings = AppSettings {
            source_path: path.display().to_string(),
            sample_format: PcmFormat::U8,
            chunk_bytes: 64,
            ..AppSettings::default()
        };
        let stream = PcmStream::new(StreamConfig::default());
        let mut cursor = stream.start_with_driver().expect("start");
        let running = AtomicBool::new(true);

        let blocks = run_source(&settings, &stream, &running).expect("run source");
        let _ = std::fs::remove_file(&path);
        assert_eq!(blocks, 4);

        let mut out = vec![0f32; 200];
        let report = cursor.render(&mut out);
        assert_eq!(report.filled, 200);
        let expected = PcmFormat::U8.decode(&bytes);
        assert_eq!(out, expected);
    }

    #[test]
    fn stopped_stream_halts_the_source() {
        let path = std::env::temp_dir().join(format!("pcmstream-halt-{}.raw", std::process::id()));
        std::fs::write(&path, vec![128u8; 256]).unwrap();

        let settings = AppSettings {
            source_path: path.display().to_string(),
            chunk_bytes: 64,
            ..AppSettings::default()
        };
        let stream = PcmStream::new(StreamConfig::default());
        let running = AtomicBool::new(true);

        let blocks = run_source(&settings, &stream, &running).expect("run source");
        let _ = std::fs::remove_file(&path);
        assert_eq!(blocks, 0);
        assert!(!running.load(Ordering::Relaxed));
    }
}
