//! Immutable sample block handed from the producer to the render context.

/// A contiguous run of PCM samples queued as one unit.
///
/// Sample rate and channel layout are fixed by the surrounding stream and
/// are not carried per block. Interleaved frames are passed through as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBlock {
    samples: Box<[f32]>,
}

impl SampleBlock {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the block holds no samples. Empty blocks are legal
    /// and are treated as already exhausted by the render cursor.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of this block in seconds for the given frame layout.
    pub fn duration_secs(&self, sample_rate: u32, channels: u16) -> f64 {
        let frames = self.samples.len() / channels.max(1) as usize;
        frames as f64 / sample_rate.max(1) as f64
    }
}

impl From<Vec<f32>> for SampleBlock {
    fn from(samples: Vec<f32>) -> Self {
        Self::new(samples)
    }
}

impl From<&[f32]> for SampleBlock {
    fn from(samples: &[f32]) -> Self {
        Self::new(samples.to_vec())
    }
}
