//! # pcmstream-core
//!
//! Real-time PCM streaming buffer.
//!
//! ## Architecture
//!
//! ```text
//! producer (pipe / WAV / network)                     audio device clock
//!         │                                                   │
//!   PcmStream::enqueue ── ChunkProducer ══ SPSC ══► RenderCursor::render
//!         ▲                                                   │
//!         └──────── retired blocks (freed off the RT thread) ─┘
//! ```
//!
//! The producer side may allocate and block. The render side is invoked once
//! per device period and is wait-free: it pops whole blocks, copies samples
//! into the output buffer and pads with silence on underrun.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod render;
pub mod source;

// Convenience re-exports for downstream crates
pub use buffering::{create_chunk_queue, ChunkConsumer, ChunkProducer, SampleBlock};
pub use diagnostics::DiagnosticsSnapshot;
pub use engine::{PcmStream, StreamConfig};
pub use error::StreamError;
pub use ipc::events::{ChunkAcceptedEvent, StreamStatus, StreamStatusEvent};
pub use render::{RenderCursor, RenderReport};
pub use source::PcmFormat;
