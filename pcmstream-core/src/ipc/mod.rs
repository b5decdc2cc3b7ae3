//! Types published to stream observers over `tokio::sync::broadcast`.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward them across a process or network boundary as JSON.

pub mod events;
