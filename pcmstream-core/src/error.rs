use thiserror::Error;

/// All errors produced by pcmstream-core.
///
/// The chunk queue and render cursor are total and never produce these;
/// they come from device handling, stream lifecycle and sources.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("stream is already running")]
    AlreadyRunning,

    #[error("stream is not running")]
    NotRunning,

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
