//! Render cursor: drains queued sample blocks into fixed-size output blocks.
//!
//! ## Algorithm (per `render` call)
//!
//! 1. Zero-fill the whole output block (silence is the default end state).
//! 2. While the output is not full:
//!    a. If there is no current block, or it is exhausted, pop the next one.
//!       Stop if the queue is empty (underrun, remainder stays silent).
//!    b. Copy `min(remaining in block, remaining in output)` samples.
//!    c. Advance both the write position and the block offset.
//!
//! Blocks need not line up with output boundaries: one call may span several
//! blocks, and a block may be left partially drained for the next call.
//!
//! `render` runs on the real-time audio thread. It never blocks, never
//! allocates and never fails. Exhausted blocks are handed back to the
//! producer side for release.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{
    buffering::{ChunkConsumer, SampleBlock},
    diagnostics::StreamDiagnostics,
};

/// Outcome of a single render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderReport {
    /// Samples copied from queued blocks. Everything after this index is silence.
    pub filled: usize,
    /// Length of the output block.
    pub requested: usize,
}

impl RenderReport {
    pub fn is_underrun(&self) -> bool {
        self.filled < self.requested
    }

    /// The cursor has no terminal state; the driver must keep the stream alive.
    pub const fn keep_alive(&self) -> bool {
        true
    }
}

/// Consumer-side state: the block currently being drained and the read
/// offset into it.
pub struct RenderCursor {
    consumer: ChunkConsumer,
    current: Option<SampleBlock>,
    offset: usize,
    diagnostics: Option<Arc<StreamDiagnostics>>,
    /// Cleared when the owning stream session is torn down.
    live: Option<Arc<AtomicBool>>,
}

impl RenderCursor {
    pub fn new(consumer: ChunkConsumer) -> Self {
        Self {
            consumer,
            current: None,
            offset: 0,
            diagnostics: None,
            live: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<StreamDiagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Tie the cursor to a session flag. Once the flag is cleared the cursor
    /// discards its remaining audio and renders silence from then on.
    pub fn with_session_flag(mut self, live: Arc<AtomicBool>) -> Self {
        self.live = Some(live);
        self
    }

    /// Fill `output` from the queue, padding with silence on underrun.
    pub fn render(&mut self, output: &mut [f32]) -> RenderReport {
        output.fill(0.0);

        if self.is_torn_down() {
            if self.current.is_some() || !self.consumer.is_empty() {
                self.clear();
            }
            return RenderReport {
                filled: 0,
                requested: output.len(),
            };
        }

        let mut i = 0;
        while i < output.len() {
            if self.is_exhausted() {
                if !self.advance() {
                    break;
                }
                // Re-check: the popped block may itself be empty.
                continue;
            }

            let Some(block) = self.current.as_ref() else {
                break;
            };
            let samples = block.samples();
            // offset can only exceed the length through a logic error; clamp
            // rather than panic on the audio thread.
            let offset = self.offset.min(samples.len());
            let to_copy = (samples.len() - offset).min(output.len() - i);

            output[i..i + to_copy].copy_from_slice(&samples[offset..offset + to_copy]);
            i += to_copy;
            self.offset = offset + to_copy;
        }

        if let Some(diag) = &self.diagnostics {
            diag.record_render(i, output.len());
        }

        RenderReport {
            filled: i,
            requested: output.len(),
        }
    }

    /// Samples left in the block currently being drained.
    pub fn remaining_in_current(&self) -> usize {
        self.current
            .as_ref()
            .map_or(0, |block| block.len().saturating_sub(self.offset))
    }

    /// Drop the current block and everything still queued. Returns the number
    /// of blocks discarded. Used on teardown; there is no drain guarantee.
    pub fn clear(&mut self) -> usize {
        let mut discarded = self.consumer.clear();
        if self.current.take().is_some() {
            discarded += 1;
        }
        self.offset = 0;
        discarded
    }

    fn is_torn_down(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| !live.load(Ordering::Acquire))
    }

    fn is_exhausted(&self) -> bool {
        self.current
            .as_ref()
            .map_or(true, |block| self.offset >= block.len())
    }

    /// Retire the exhausted block and pop the next. Returns `false` if the
    /// queue was empty, leaving the cursor cleared.
    fn advance(&mut self) -> bool {
        if let Some(done) = self.current.take() {
            if let Some(diag) = &self.diagnostics {
                diag.record_retired();
            }
            // A full return lane drops the block here instead.
            let _ = self.consumer.retire(done);
        }
        self.offset = 0;

        match self.consumer.pop_front() {
            Some(next) => {
                self.current = Some(next);
                true
            }
            None => false,
        }
    }
}
