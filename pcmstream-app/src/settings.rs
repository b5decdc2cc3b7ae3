//! Persistent player settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pcmstream_core::{PcmFormat, StreamConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SOURCE_PATH: &str = "/config/pcspk_audio/pcspk_out.raw";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// FIFO, raw file, `.wav` file, or `-` for stdin.
    pub source_path: String,
    pub sample_format: PcmFormat,
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes requested per source read; one read becomes one queued block.
    pub chunk_bytes: usize,
    pub block_frames: Option<u32>,
    pub preferred_output_device: Option<String>,
    pub reopen_backoff_ms: u64,
    pub missing_source_backoff_ms: u64,
    /// Seconds between diagnostics log lines. 0 disables them.
    pub stats_interval_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            source_path: DEFAULT_SOURCE_PATH.into(),
            sample_format: PcmFormat::U8,
            sample_rate: 32_000,
            channels: 1,
            chunk_bytes: 4096,
            block_frames: None,
            preferred_output_device: None,
            reopen_backoff_ms: 10,
            missing_source_backoff_ms: 500,
            stats_interval_secs: 10,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let source = self.source_path.trim();
        self.source_path = if source.is_empty() {
            DEFAULT_SOURCE_PATH.into()
        } else {
            source.to_string()
        };
        self.sample_rate = self.sample_rate.clamp(8_000, 192_000);
        self.channels = self.channels.clamp(1, 8);
        let bps = self.sample_format.bytes_per_sample();
        self.chunk_bytes = self.chunk_bytes.clamp(64, 1 << 20) / bps * bps;
        self.block_frames = self
            .block_frames
            .filter(|&frames| frames > 0)
            .map(|frames| frames.clamp(16, 8192));
        self.preferred_output_device = self
            .preferred_output_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.reopen_backoff_ms = self.reopen_backoff_ms.clamp(1, 10_000);
        self.missing_source_backoff_ms = self.missing_source_backoff_ms.clamp(10, 60_000);
        self.stats_interval_secs = self.stats_interval_secs.min(3600);
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            block_frames: self.block_frames,
            preferred_output_device: self.preferred_output_device.clone(),
            ..StreamConfig::default()
        }
    }

    pub fn reopen_backoff(&self) -> Duration {
        Duration::from_millis(self.reopen_backoff_ms)
    }

    pub fn missing_source_backoff(&self) -> Duration {
        Duration::from_millis(self.missing_source_backoff_ms)
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pcmstream")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("pcmstream")
            .join("settings.json")
    }
}

/// Load settings, falling back to defaults when the file is missing or
/// unreadable.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
