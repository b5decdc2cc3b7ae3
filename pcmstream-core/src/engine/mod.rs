//! `PcmStream`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! PcmStream::new()
//!     └─► start()               → queue created, device open, status = Playing
//!     └─► start_with_driver()   → queue created, cursor returned, status = Playing
//!         └─► enqueue(..)       → block appended, ChunkAcceptedEvent broadcast
//!         └─► stop()            → session flag cleared, queue + cursor dropped,
//!                                 status = Stopped
//! ```
//!
//! Each `start` opens a fresh session: a new chunk queue, a new render cursor
//! and a new session flag. Nothing queued in one session is ever played in
//! the next.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS. `AudioPlayback` is therefore
//! created on a dedicated `pcm-output` thread that parks until the session
//! ends, then drops the stream (and with it the render cursor). A sync
//! oneshot channel propagates open-device errors back to the `start()` caller.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    audio::{AudioPlayback, ErrorHook},
    buffering::{create_chunk_queue, ChunkProducer, SampleBlock, DEFAULT_QUEUE_CAPACITY},
    diagnostics::{DiagnosticsSnapshot, StreamDiagnostics},
    error::{Result, StreamError},
    ipc::events::{ChunkAcceptedEvent, StreamStatus, StreamStatusEvent},
    render::RenderCursor,
};

/// Broadcast channel capacity: events buffered for slow subscribers.
const BROADCAST_CAP: usize = 256;

/// How often the output thread re-checks the session flag while parked.
const OUTPUT_PARK_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for `PcmStream`.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Output sample rate (Hz). Fixed for the life of the stream; blocks
    /// carry no rate of their own. Default: 32000.
    pub sample_rate: u32,
    /// Interleaved channel count. Default: 1.
    pub channels: u16,
    /// Device period in frames. `None` leaves it to the device.
    pub block_frames: Option<u32>,
    /// Slots in each queue ring. Blocks beyond this wait on the producer
    /// side. Default: 1024.
    pub queue_capacity: usize,
    /// Output device to prefer over the system default.
    pub preferred_output_device: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 32_000,
            channels: 1,
            block_frames: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            preferred_output_device: None,
        }
    }
}

/// State owned by one start/stop cycle.
struct Session {
    producer: ChunkProducer,
    live: Arc<AtomicBool>,
    output_thread: Option<JoinHandle<()>>,
}

/// The top-level stream handle.
///
/// `PcmStream` is `Send + Sync`; wrap it in `Arc` to share between the
/// producer task and whatever observes status. `enqueue` takes a lock that
/// only producer-side callers contend on; the render path never touches it.
pub struct PcmStream {
    config: StreamConfig,
    session: Mutex<Option<Session>>,
    status: Arc<Mutex<StreamStatus>>,
    chunk_tx: broadcast::Sender<ChunkAcceptedEvent>,
    status_tx: broadcast::Sender<StreamStatusEvent>,
    seq: AtomicU64,
    diagnostics: Arc<StreamDiagnostics>,
}

impl PcmStream {
    /// Create a new stream. Does not open anything; call `start()`.
    pub fn new(config: StreamConfig) -> Self {
        let (chunk_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            session: Mutex::new(None),
            status: Arc::new(Mutex::new(StreamStatus::Idle)),
            chunk_tx,
            status_tx,
            seq: AtomicU64::new(0),
            diagnostics: Arc::new(StreamDiagnostics::default()),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Open the configured (or default) output device and start playback.
    ///
    /// Blocks until the device is confirmed open or has failed.
    ///
    /// # Errors
    /// - `StreamError::AlreadyRunning` if already started.
    /// - `StreamError::NoDefaultOutputDevice` / `StreamError::AudioStream` on device error.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(self.config.preferred_output_device.clone())
    }

    /// Start playback on a preferred output device name.
    ///
    /// If `preferred_output_device` is `None`, default output selection is used.
    pub fn start_with_device(&self, preferred_output_device: Option<String>) -> Result<()> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(StreamError::AlreadyRunning);
        }

        let (producer, cursor, live) = self.open_session();
        let config = self.config.clone();
        let thread_live = Arc::clone(&live);
        let on_error = self.error_hook();

        // Sync oneshot: output thread signals open success/failure to start().
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<(u32, u16)>>();

        let handle = thread::Builder::new()
            .name("pcm-output".into())
            .spawn(move || {
                // ── Open device (must happen on THIS thread, cpal::Stream is !Send) ──
                let playback = match AudioPlayback::open_with_preference(
                    cursor,
                    Arc::clone(&thread_live),
                    &config,
                    preferred_output_device.as_deref(),
                    on_error,
                ) {
                    Ok(p) => {
                        let _ = open_tx.send(Ok((p.sample_rate, p.channels)));
                        p
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };

                while thread_live.load(Ordering::Acquire) {
                    thread::park_timeout(OUTPUT_PARK_INTERVAL);
                }

                // Stream and cursor drop here, releasing the device on this thread.
                playback.stop();
                drop(playback);
                debug!("output stream released");
            })?;

        match open_rx.recv() {
            Ok(Ok((sample_rate, channels))) => {
                *session = Some(Session {
                    producer,
                    live,
                    output_thread: Some(handle),
                });
                drop(session);
                self.set_status(StreamStatus::Playing, None);
                info!(sample_rate, channels, "stream started, playing");
                Ok(())
            }
            Ok(Err(e)) => {
                live.store(false, Ordering::Release);
                let _ = handle.join();
                self.set_status(StreamStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent: the thread panicked.
                live.store(false, Ordering::Release);
                let _ = handle.join();
                self.set_status(StreamStatus::Error, Some("output failed to start".into()));
                Err(StreamError::Other(anyhow::anyhow!(
                    "output thread died unexpectedly"
                )))
            }
        }
    }

    /// Start a session without opening a device. The caller's own periodic
    /// driver owns the returned cursor and calls `render` on it.
    ///
    /// # Errors
    /// - `StreamError::AlreadyRunning` if already started.
    pub fn start_with_driver(&self) -> Result<RenderCursor> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(StreamError::AlreadyRunning);
        }

        let (producer, cursor, live) = self.open_session();
        *session = Some(Session {
            producer,
            live,
            output_thread: None,
        });
        drop(session);

        self.set_status(StreamStatus::Playing, None);
        info!("stream started with external driver");
        Ok(cursor)
    }

    /// Tear down the session. Anything still queued or partially played is
    /// discarded without flushing.
    ///
    /// # Errors
    /// - `StreamError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        let Some(Session {
            producer,
            live,
            output_thread,
        }) = self.session.lock().take()
        else {
            return Err(StreamError::NotRunning);
        };

        live.store(false, Ordering::Release);
        let discarded_blocks = producer.queued_blocks();
        drop(producer);

        if let Some(handle) = output_thread {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("output thread panicked during teardown");
            }
        }

        self.set_status(StreamStatus::Stopped, None);
        info!(discarded_blocks, "stream stopped");
        Ok(())
    }

    /// Append a block of samples to the playback queue.
    ///
    /// Returns the number of samples accepted. Empty blocks are accepted and
    /// simply skipped by the renderer.
    ///
    /// # Errors
    /// - `StreamError::NotRunning` if no session is active.
    pub fn enqueue(&self, block: impl Into<SampleBlock>) -> Result<usize> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(StreamError::NotRunning)?;
        let size = session.producer.enqueue(block);
        drop(guard);

        self.diagnostics.record_enqueue(size);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.chunk_tx.send(ChunkAcceptedEvent { seq, size });
        debug!(seq, size, "chunk accepted");
        Ok(size)
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Blocks waiting in the queue, not counting the one being drained.
    pub fn queued_blocks(&self) -> usize {
        self.session
            .lock()
            .as_ref()
            .map_or(0, |s| s.producer.queued_blocks())
    }

    /// Move blocks held back by a full queue ring into it and release
    /// retired blocks. `enqueue` does this on every call; a producer that has
    /// stopped enqueueing calls it until it returns 0 so the tail plays out.
    /// Returns the number of blocks still held back.
    pub fn flush(&self) -> usize {
        self.session
            .lock()
            .as_mut()
            .map_or(0, |s| s.producer.flush())
    }

    /// Current stream status (snapshot).
    pub fn status(&self) -> StreamStatus {
        *self.status.lock()
    }

    /// Subscribe to chunk acknowledgements.
    pub fn subscribe_chunks(&self) -> broadcast::Receiver<ChunkAcceptedEvent> {
        self.chunk_tx.subscribe()
    }

    /// Subscribe to status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StreamStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of stream counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn open_session(&self) -> (ChunkProducer, RenderCursor, Arc<AtomicBool>) {
        self.diagnostics.reset();
        let (producer, consumer) = create_chunk_queue(self.config.queue_capacity);
        let live = Arc::new(AtomicBool::new(true));
        let cursor = RenderCursor::new(consumer)
            .with_diagnostics(Arc::clone(&self.diagnostics))
            .with_session_flag(Arc::clone(&live));
        (producer, cursor, live)
    }

    fn set_status(&self, new_status: StreamStatus, detail: Option<String>) {
        publish_status(&self.status, &self.status_tx, new_status, detail);
    }

    /// Hook for the output backend to report a stream that failed after it
    /// was opened.
    fn error_hook(&self) -> ErrorHook {
        let status = Arc::clone(&self.status);
        let status_tx = self.status_tx.clone();
        Arc::new(move |detail: String| {
            publish_status(&status, &status_tx, StreamStatus::Error, Some(detail));
        })
    }
}

fn publish_status(
    status: &Mutex<StreamStatus>,
    status_tx: &broadcast::Sender<StreamStatusEvent>,
    new_status: StreamStatus,
    detail: Option<String>,
) {
    *status.lock() = new_status;
    let _ = status_tx.send(StreamStatusEvent {
        status: new_status,
        detail,
    });
}

impl Drop for PcmStream {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_requires_running_session() {
        let stream = PcmStream::new(StreamConfig::default());
        assert!(matches!(
            stream.enqueue(vec![0.1; 4]),
            Err(StreamError::NotRunning)
        ));
        assert!(matches!(stream.stop(), Err(StreamError::NotRunning)));
        assert_eq!(stream.status(), StreamStatus::Idle);
    }

    #[test]
    fn second_start_is_rejected() {
        let stream = PcmStream::new(StreamConfig::default());
        let _cursor = stream.start_with_driver().expect("first start");
        assert!(matches!(
            stream.start_with_driver(),
            Err(StreamError::AlreadyRunning)
        ));
        assert_eq!(stream.status(), StreamStatus::Playing);
    }

    #[test]
    fn enqueue_broadcasts_acknowledgement() {
        let stream = PcmStream::new(StreamConfig::default());
        let mut chunks = stream.subscribe_chunks();
        let _cursor = stream.start_with_driver().expect("start");

        assert_eq!(stream.enqueue(vec![0.0; 4096]).unwrap(), 4096);
        assert_eq!(stream.enqueue(Vec::new()).unwrap(), 0);

        let first = chunks.try_recv().expect("first ack");
        let second = chunks.try_recv().expect("second ack");
        assert_eq!((first.seq, first.size), (0, 4096));
        assert_eq!((second.seq, second.size), (1, 0));
        assert_eq!(stream.queued_blocks(), 2);
    }

    #[test]
    fn stop_discards_queue_and_silences_cursor() {
        let stream = PcmStream::new(StreamConfig::default());
        let mut status = stream.subscribe_status();
        let mut cursor = stream.start_with_driver().expect("start");

        stream.enqueue(vec![0.5; 8]).unwrap();
        let mut out = [0.0f32; 4];
        cursor.render(&mut out);
        assert_eq!(out, [0.5; 4]);

        stream.stop().expect("stop");
        cursor.render(&mut out);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(stream.status(), StreamStatus::Stopped);

        assert_eq!(status.try_recv().unwrap().status, StreamStatus::Playing);
        assert_eq!(status.try_recv().unwrap().status, StreamStatus::Stopped);
    }

    #[test]
    fn restart_opens_a_fresh_queue() {
        let stream = PcmStream::new(StreamConfig::default());
        let _old = stream.start_with_driver().expect("start");
        stream.enqueue(vec![1.0; 16]).unwrap();
        stream.stop().expect("stop");

        let mut cursor = stream.start_with_driver().expect("restart");
        let mut out = [9.0f32; 4];
        let report = cursor.render(&mut out);
        assert_eq!(out, [0.0; 4]);
        assert!(report.is_underrun());
        assert_eq!(stream.diagnostics_snapshot().samples_enqueued, 0);
    }

    #[test]
    fn flush_releases_blocks_held_by_a_full_ring() {
        let stream = PcmStream::new(StreamConfig {
            queue_capacity: 2,
            ..StreamConfig::default()
        });
        let mut cursor = stream.start_with_driver().expect("start");
        for v in 1..=4 {
            stream.enqueue(vec![v as f32; 2]).unwrap();
        }
        assert_eq!(stream.queued_blocks(), 4);

        let mut out = [0.0f32; 8];
        let report = cursor.render(&mut out);
        assert_eq!(report.filled, 4);

        assert_eq!(stream.flush(), 0);
        cursor.render(&mut out);
        assert_eq!(&out[..4], &[3.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn backend_error_hook_publishes_error_status() {
        let stream = PcmStream::new(StreamConfig::default());
        let mut status = stream.subscribe_status();
        let _cursor = stream.start_with_driver().expect("start");
        assert_eq!(status.try_recv().unwrap().status, StreamStatus::Playing);

        let hook = stream.error_hook();
        hook("device unplugged".into());

        assert_eq!(stream.status(), StreamStatus::Error);
        let event = status.try_recv().expect("error event");
        assert_eq!(event.status, StreamStatus::Error);
        assert_eq!(event.detail.as_deref(), Some("device unplugged"));
    }

    #[cfg(not(feature = "audio-cpal"))]
    #[test]
    fn start_without_output_backend_fails_cleanly() {
        let stream = PcmStream::new(StreamConfig::default());
        assert!(matches!(stream.start(), Err(StreamError::AudioStream(_))));
        assert_eq!(stream.status(), StreamStatus::Error);
        assert!(!stream.is_running());
    }
}
