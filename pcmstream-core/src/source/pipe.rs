//! Blocking reader for a named pipe (FIFO) or plain file.
//!
//! ## Loop
//!
//! ```text
//! open(path) ── NotFound ──► sleep(missing_backoff) ──► retry
//!     │
//!     ▼
//! read chunk ──► decode ──► on_block(SampleBlock)
//!     │
//!  EOF / error (writer went away)
//!     │
//!     ▼
//! follow? ── yes ──► sleep(reopen_backoff) ──► reopen
//!     └───── no ───► return
//! ```
//!
//! Opening a FIFO blocks until a writer connects, so this must run on a
//! dedicated thread (or `spawn_blocking`). The `running` flag is checked
//! between reads and between open attempts.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{ChunkReader, PcmFormat, DEFAULT_CHUNK_BYTES};
use crate::buffering::SampleBlock;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct PipeSource {
    pub path: PathBuf,
    pub format: PcmFormat,
    pub chunk_bytes: usize,
    /// Reopen after EOF instead of returning. Set for FIFOs whose writer may
    /// come and go.
    pub follow: bool,
    /// Pause before reopening after the writer disconnects.
    pub reopen_backoff: Duration,
    /// Pause between attempts while the path does not exist.
    pub missing_backoff: Duration,
}

impl PipeSource {
    pub fn new(path: impl Into<PathBuf>, format: PcmFormat) -> Self {
        let path = path.into();
        let follow = is_fifo(&path);
        Self {
            path,
            format,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            follow,
            reopen_backoff: Duration::from_millis(10),
            missing_backoff: Duration::from_millis(500),
        }
    }

    /// Read until `running` clears (or EOF when not following), handing every
    /// decoded block to `on_block`. Returns the number of blocks delivered.
    ///
    /// # Errors
    /// Open failures other than `NotFound` are returned.
    pub fn run<F>(&self, running: &AtomicBool, mut on_block: F) -> Result<usize>
    where
        F: FnMut(SampleBlock),
    {
        let mut delivered = 0usize;

        while running.load(Ordering::Relaxed) {
            let file = match File::open(&self.path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %self.path.display(), "source not found, waiting");
                    thread::sleep(self.missing_backoff);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            info!(path = %self.path.display(), format = %self.format, "source opened");

            let mut reader = ChunkReader::new(file, self.format, self.chunk_bytes);
            while running.load(Ordering::Relaxed) {
                match reader.next_block() {
                    Ok(Some(block)) => {
                        delivered += 1;
                        on_block(block);
                    }
                    Ok(None) => {
                        info!("source writer closed");
                        break;
                    }
                    Err(e) => {
                        warn!("source read failed: {e}");
                        break;
                    }
                }
            }

            // A path created after construction may turn out to be a FIFO.
            if !(self.follow || is_fifo(&self.path)) {
                break;
            }
            thread::sleep(self.reopen_backoff);
        }

        Ok(delivered)
    }
}

/// Whether `path` is a named pipe. Always `false` off Unix.
pub fn is_fifo(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        std::fs::metadata(path)
            .map(|m| m.file_type().is_fifo())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        false
    }
}
