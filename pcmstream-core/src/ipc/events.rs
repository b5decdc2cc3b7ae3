//! Event types broadcast to stream observers.
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `ChunkAcceptedEvent` | `PcmStream::subscribe_chunks` |
//! | `StreamStatusEvent` | `PcmStream::subscribe_status` |
//!
//! Both serialize as camelCase JSON so they can be forwarded unchanged to a
//! UI or a remote producer for flow pacing.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chunk acknowledgements
// ---------------------------------------------------------------------------

/// Emitted after a block has been accepted into the queue.
///
/// Purely informational: a producer may use it to pace itself, but nothing
/// in the stream depends on it being observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAcceptedEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Number of samples in the accepted block.
    pub size: usize,
}

// ---------------------------------------------------------------------------
// Stream status events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatusEvent {
    pub status: StreamStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Lifecycle state of a `PcmStream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// Created but `start()` not yet called.
    Idle,
    /// Output device open; the render callback is draining the queue.
    Playing,
    /// Torn down; queued audio was discarded. May be restarted.
    Stopped,
    /// Device failed to open or errored mid-stream.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_event_serializes_with_camel_case() {
        let event = ChunkAcceptedEvent { seq: 12, size: 4096 };

        let json = serde_json::to_value(&event).expect("serialize chunk event");
        assert_eq!(json["seq"], 12);
        assert_eq!(json["size"], 4096);
    }

    #[test]
    fn status_event_serializes_with_lowercase_status() {
        let event = StreamStatusEvent {
            status: StreamStatus::Playing,
            detail: None,
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "playing");
        assert!(json["detail"].is_null());

        let round_trip: StreamStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, StreamStatus::Playing);
    }

    #[test]
    fn status_rejects_non_lowercase_values() {
        let err = serde_json::from_str::<StreamStatus>(r#""Stopped""#);
        assert!(err.is_err(), "expected invalid casing to fail");
    }
}
