//! Audio playback via cpal backend.
//!
//! # Design constraints
//!
//! The cpal output callback runs on an OS audio thread at elevated priority
//! once per device period. It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O or logging
//!
//! The callback only calls `RenderCursor::render`, which pops from a
//! lock-free queue and copies samples. Devices that want integer samples are
//! served through a scratch buffer allocated once when the stream is built.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioPlayback` must be created and dropped on the same thread.
//! `PcmStream` does this on its dedicated output thread.

pub mod device;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream,
};

use crate::{
    engine::StreamConfig,
    error::{Result, StreamError},
    render::RenderCursor,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Scratch size for integer output formats. Larger device periods are
/// rendered in several passes.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
const SCRATCH_SAMPLES: usize = 8192;

/// Called from the backend's error callback when a running stream fails.
pub type ErrorHook = Arc<dyn Fn(String) + Send + Sync>;

/// Handle to an active audio output stream.
///
/// **Not `Send`**: create and drop on the same OS thread.
pub struct AudioPlayback {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag: when `false` the callback writes silence without
    /// touching the queue.
    running: Arc<AtomicBool>,
    /// Actual output sample rate (Hz).
    pub sample_rate: u32,
    /// Actual output channel count.
    pub channels: u16,
}

#[cfg(feature = "audio-cpal")]
impl AudioPlayback {
    /// Open an output device by preferred name, otherwise fall back to the
    /// default output device and then the first available one.
    ///
    /// The stream is opened at exactly `config.sample_rate` and
    /// `config.channels`; a device that cannot do that fails to open rather
    /// than being resampled or remixed.
    pub fn open_with_preference(
        cursor: RenderCursor,
        running: Arc<AtomicBool>,
        config: &StreamConfig,
        preferred_device_name: Option<&str>,
        on_error: ErrorHook,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.output_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });

                    if selected_device.is_none() {
                        warn!(
                            "preferred output device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list output devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_output_device() {
            default
        } else {
            let mut devices = host
                .output_devices()
                .map_err(|e| StreamError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(StreamError::NoDefaultOutputDevice)?;
            warn!("no default output device, falling back to first available output");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening output device"
        );

        let sample_format = device
            .default_output_config()
            .map_err(|e| StreamError::AudioDevice(e.to_string()))?
            .sample_format();

        let buffer_size = match config.block_frames {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        };
        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size,
        };

        info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            block_frames = ?config.block_frames,
            format = ?sample_format,
            "audio config selected"
        );

        let stream = match sample_format {
            SampleFormat::F32 => {
                let mut cursor = cursor;
                let running = Arc::clone(&running);
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _info| {
                        if !running.load(Ordering::Relaxed) {
                            data.fill(0.0);
                            return;
                        }
                        cursor.render(data);
                    },
                    {
                        let on_error = Arc::clone(&on_error);
                        move |err| {
                            error!("audio stream error: {err}");
                            on_error(err.to_string());
                        }
                    },
                    None,
                )
            }

            SampleFormat::I16 => {
                let mut cursor = cursor;
                let running = Arc::clone(&running);
                let mut scratch = vec![0f32; SCRATCH_SAMPLES];
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _info| {
                        if !running.load(Ordering::Relaxed) {
                            data.fill(0);
                            return;
                        }
                        render_converted(&mut cursor, &mut scratch, data, f32_to_i16);
                    },
                    {
                        let on_error = Arc::clone(&on_error);
                        move |err| {
                            error!("audio stream error: {err}");
                            on_error(err.to_string());
                        }
                    },
                    None,
                )
            }

            SampleFormat::U16 => {
                let mut cursor = cursor;
                let running = Arc::clone(&running);
                let mut scratch = vec![0f32; SCRATCH_SAMPLES];
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [u16], _info| {
                        if !running.load(Ordering::Relaxed) {
                            data.fill(u16::MAX / 2 + 1);
                            return;
                        }
                        render_converted(&mut cursor, &mut scratch, data, f32_to_u16);
                    },
                    {
                        let on_error = Arc::clone(&on_error);
                        move |err| {
                            error!("audio stream error: {err}");
                            on_error(err.to_string());
                        }
                    },
                    None,
                )
            }

            fmt => {
                return Err(StreamError::AudioStream(format!(
                    "unsupported output sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| StreamError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| StreamError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate: config.sample_rate,
            channels: config.channels,
        })
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioPlayback {
    pub fn open_with_preference(
        _cursor: RenderCursor,
        _running: Arc<AtomicBool>,
        _config: &StreamConfig,
        _preferred_device_name: Option<&str>,
        _on_error: ErrorHook,
    ) -> Result<Self> {
        Err(StreamError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl AudioPlayback {
    /// Stop: signal the callback to output silence on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Render one device period into an integer buffer through `scratch`,
/// one scratch-sized piece at a time. The cursor carries its position across
/// the pieces, so the output is the same as a single render of `out.len()`.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn render_converted<T>(
    cursor: &mut RenderCursor,
    scratch: &mut [f32],
    out: &mut [T],
    convert: fn(f32) -> T,
) {
    let step = scratch.len().max(1);
    for piece in out.chunks_mut(step) {
        let block = &mut scratch[..piece.len()];
        cursor.render(block);
        for (dst, &src) in piece.iter_mut().zip(block.iter()) {
            *dst = convert(src);
        }
    }
}

#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn f32_to_i16(v: f32) -> i16 {
    let v = v.clamp(-1.0, 1.0);
    (v * i16::MAX as f32) as i16
}

#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn f32_to_u16(v: f32) -> u16 {
    let v = v.clamp(-1.0, 1.0);
    let normalized = (v + 1.0) * 0.5;
    (normalized * u16::MAX as f32) as u16
}

#[cfg(test)]
mod tests {
    use super::{f32_to_i16, f32_to_u16, render_converted};
    use crate::{buffering::create_chunk_queue, render::RenderCursor};

    #[test]
    fn integer_conversion_clamps_out_of_range() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_u16(-1.0), 0);
        assert_eq!(f32_to_u16(1.0), u16::MAX);
    }

    #[test]
    fn long_period_renders_contiguously_through_small_scratch() {
        let (mut producer, consumer) = create_chunk_queue(8);
        let mut cursor = RenderCursor::new(consumer);
        producer.enqueue(vec![0.5; 5]);
        producer.enqueue(vec![-0.5; 7]);
        producer.enqueue(vec![0.25; 4]);

        let mut scratch = [0.0f32; 8];
        let mut out = [i16::MIN; 20];
        render_converted(&mut cursor, &mut scratch, &mut out, f32_to_i16);

        let half = f32_to_i16(0.5);
        let quarter = f32_to_i16(0.25);
        let mut expected = vec![half; 5];
        expected.extend(vec![-half; 7]);
        expected.extend(vec![quarter; 4]);
        expected.extend(vec![0; 4]);
        assert_eq!(out.to_vec(), expected);
    }
}
