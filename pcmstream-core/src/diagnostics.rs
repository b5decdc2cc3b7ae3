//! Stream counters shared between the producer and render contexts.
//!
//! All updates are `Relaxed` atomic adds so the render callback stays
//! wait-free.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct StreamDiagnostics {
    pub blocks_enqueued: AtomicUsize,
    pub samples_enqueued: AtomicUsize,
    pub render_calls: AtomicUsize,
    pub samples_rendered: AtomicUsize,
    /// Render calls that ran out of queued audio before filling the output.
    pub underruns: AtomicUsize,
    pub blocks_retired: AtomicUsize,
}

impl StreamDiagnostics {
    pub fn record_enqueue(&self, samples: usize) {
        self.blocks_enqueued.fetch_add(1, Ordering::Relaxed);
        self.samples_enqueued.fetch_add(samples, Ordering::Relaxed);
    }

    pub fn record_render(&self, filled: usize, requested: usize) {
        self.render_calls.fetch_add(1, Ordering::Relaxed);
        self.samples_rendered.fetch_add(filled, Ordering::Relaxed);
        if filled < requested {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_retired(&self) {
        self.blocks_retired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.blocks_enqueued.store(0, Ordering::Relaxed);
        self.samples_enqueued.store(0, Ordering::Relaxed);
        self.render_calls.store(0, Ordering::Relaxed);
        self.samples_rendered.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.blocks_retired.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            blocks_enqueued: self.blocks_enqueued.load(Ordering::Relaxed),
            samples_enqueued: self.samples_enqueued.load(Ordering::Relaxed),
            render_calls: self.render_calls.load(Ordering::Relaxed),
            samples_rendered: self.samples_rendered.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            blocks_retired: self.blocks_retired.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub blocks_enqueued: usize,
    pub samples_enqueued: usize,
    pub render_calls: usize,
    pub samples_rendered: usize,
    pub underruns: usize,
    pub blocks_retired: usize,
}

impl DiagnosticsSnapshot {
    /// Samples accepted but not yet rendered, including the partially
    /// drained current block.
    pub fn pending_samples(&self) -> usize {
        self.samples_enqueued.saturating_sub(self.samples_rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_render_counts_as_underrun() {
        let diag = StreamDiagnostics::default();
        diag.record_enqueue(10);
        diag.record_render(4, 4);
        diag.record_render(4, 4);
        diag.record_render(2, 4);

        let snap = diag.snapshot();
        assert_eq!(snap.render_calls, 3);
        assert_eq!(snap.samples_rendered, 10);
        assert_eq!(snap.underruns, 1);
        assert_eq!(snap.pending_samples(), 0);
    }

    #[test]
    fn reset_zeroes_every_counter() {
        let diag = StreamDiagnostics::default();
        diag.record_enqueue(128);
        diag.record_render(0, 64);
        diag.record_retired();
        diag.reset();

        let snap = diag.snapshot();
        assert_eq!(snap, DiagnosticsSnapshot {
            blocks_enqueued: 0,
            samples_enqueued: 0,
            render_calls: 0,
            samples_rendered: 0,
            underruns: 0,
            blocks_retired: 0,
        });
    }
}
