//! Producer-side sources that turn raw transport bytes into `SampleBlock`s.
//!
//! The render path never inspects what it is given: validating and decoding
//! incoming bytes happens here, before `enqueue`.

pub mod pipe;
pub mod wav;

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::buffering::SampleBlock;
use crate::error::StreamError;

/// Default bytes per read, matching a typical pipe buffer page.
pub const DEFAULT_CHUNK_BYTES: usize = 4096;

/// Encoding of the raw PCM byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcmFormat {
    /// Unsigned 8-bit, 128 = silence.
    U8,
    /// Signed 16-bit little-endian.
    S16Le,
    /// 32-bit float little-endian.
    F32Le,
}

impl PcmFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            PcmFormat::U8 => 1,
            PcmFormat::S16Le => 2,
            PcmFormat::F32Le => 4,
        }
    }

    /// Decode whole samples from `bytes` into f32 in [-1.0, 1.0].
    /// Trailing bytes that do not form a complete sample are ignored.
    pub fn decode(self, bytes: &[u8]) -> Vec<f32> {
        match self {
            PcmFormat::U8 => bytes.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect(),
            PcmFormat::S16Le => bytes
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
                .collect(),
            PcmFormat::F32Le => bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        }
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PcmFormat::U8 => "u8",
            PcmFormat::S16Le => "s16le",
            PcmFormat::F32Le => "f32le",
        };
        f.write_str(name)
    }
}

impl FromStr for PcmFormat {
    type Err = StreamError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Ok(PcmFormat::U8),
            "s16le" | "s16" | "i16" => Ok(PcmFormat::S16Le),
            "f32le" | "f32" | "float" => Ok(PcmFormat::F32Le),
            other => Err(StreamError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Reads fixed-size byte chunks from any `Read` and decodes them into blocks.
///
/// Short reads are normal for pipes; bytes of a sample split across two reads
/// are carried over so samples never straddle block boundaries.
pub struct ChunkReader<R> {
    inner: R,
    format: PcmFormat,
    buf: Vec<u8>,
    carry: Vec<u8>,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(inner: R, format: PcmFormat, chunk_bytes: usize) -> Self {
        let chunk_bytes = chunk_bytes.max(format.bytes_per_sample());
        Self {
            inner,
            format,
            buf: vec![0u8; chunk_bytes],
            carry: Vec::with_capacity(chunk_bytes + format.bytes_per_sample()),
        }
    }

    /// Read the next block. `Ok(None)` means the writer closed (EOF); any
    /// incomplete trailing sample is dropped.
    pub fn next_block(&mut self) -> io::Result<Option<SampleBlock>> {
        let bps = self.format.bytes_per_sample();
        loop {
            let n = match self.inner.read(&mut self.buf) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                self.carry.clear();
                return Ok(None);
            }

            self.carry.extend_from_slice(&self.buf[..n]);
            let usable = self.carry.len() - self.carry.len() % bps;
            if usable == 0 {
                continue;
            }

            let samples = self.format.decode(&self.carry[..usable]);
            self.carry.drain(..usable);
            return Ok(Some(SampleBlock::new(samples)));
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = io::Result<SampleBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    /// Yields its data in fixed-size slices to mimic short pipe reads.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn u8_silence_is_zero() {
        let out = PcmFormat::U8.decode(&[128, 0, 255]);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], -1.0);
        assert_relative_eq!(out[2], 127.0 / 128.0);
    }

    #[test]
    fn s16_decodes_little_endian() {
        let bytes = [0x00, 0x40, 0x00, 0x80];
        let out = PcmFormat::S16Le.decode(&bytes);
        assert_relative_eq!(out[0], 0.5);
        assert_relative_eq!(out[1], -1.0);
    }

    #[test]
    fn f32_passes_through() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.25f32.to_le_bytes());
        bytes.extend_from_slice(&(-0.75f32).to_le_bytes());
        bytes.push(0xFF);
        assert_eq!(PcmFormat::F32Le.decode(&bytes), vec![0.25, -0.75]);
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("U8".parse::<PcmFormat>().unwrap(), PcmFormat::U8);
        assert_eq!("s16".parse::<PcmFormat>().unwrap(), PcmFormat::S16Le);
        assert_eq!(" float ".parse::<PcmFormat>().unwrap(), PcmFormat::F32Le);
        assert!(matches!(
            "mulaw".parse::<PcmFormat>(),
            Err(StreamError::UnsupportedFormat(_))
        ));
        assert_eq!(PcmFormat::S16Le.to_string(), "s16le");
    }

    #[test]
    fn reader_splits_into_chunk_sized_blocks() {
        let data = vec![128u8; 10];
        let mut reader = ChunkReader::new(Cursor::new(data), PcmFormat::U8, 4);

        let lens: Vec<usize> = reader
            .by_ref()
            .map(|b| b.expect("read block").len())
            .collect();
        assert_eq!(lens, vec![4, 4, 2]);
        assert!(reader.next_block().unwrap().is_none());
    }

    #[test]
    fn reader_carries_split_samples_across_reads() {
        let samples: [i16; 3] = [1000, -2000, 3000];
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let trickle = Trickle { data, pos: 0, step: 3 };
        let reader = ChunkReader::new(trickle, PcmFormat::S16Le, 16);

        let decoded: Vec<f32> = reader
            .flat_map(|b| b.expect("read block").samples().to_vec())
            .collect();
        assert_eq!(decoded.len(), 3);
        assert_relative_eq!(decoded[0], 1000.0 / 32768.0);
        assert_relative_eq!(decoded[1], -2000.0 / 32768.0);
        assert_relative_eq!(decoded[2], 3000.0 / 32768.0);
    }
}
