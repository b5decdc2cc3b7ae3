//! Command-line parsing. Flags override the loaded settings file.

use std::path::PathBuf;

use pcmstream_core::PcmFormat;

use crate::settings::AppSettings;

pub const USAGE: &str = "\
Usage: pcmstream [options] [source]

  source                 FIFO, raw PCM file, .wav file, or - for stdin
                         (default: settings sourcePath)

Options:
  --settings <file>      settings JSON (default: user data dir)
  --format <fmt>         u8 | s16le | f32le
  --rate <hz>            output sample rate
  --channels <n>         interleaved channel count
  --chunk-bytes <n>      bytes per source read
  --block-frames <n>     fixed device period in frames
  --device <name>        preferred output device
  --list-devices         print output devices and exit
  --save-settings        write the effective settings back to the file
  -h, --help             show this help";

#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub settings: Option<PathBuf>,
    pub source: Option<String>,
    pub format: Option<PcmFormat>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub chunk_bytes: Option<usize>,
    pub block_frames: Option<u32>,
    pub device: Option<String>,
    pub list_devices: bool,
    pub save_settings: bool,
    pub help: bool,
}

impl Args {
    /// Overlay every flag that was given onto `settings`.
    pub fn apply_to(&self, settings: &mut AppSettings) {
        if let Some(source) = &self.source {
            settings.source_path = source.clone();
        }
        if let Some(format) = self.format {
            settings.sample_format = format;
        }
        if let Some(rate) = self.sample_rate {
            settings.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            settings.channels = channels;
        }
        if let Some(chunk_bytes) = self.chunk_bytes {
            settings.chunk_bytes = chunk_bytes;
        }
        if let Some(frames) = self.block_frames {
            settings.block_frames = Some(frames);
        }
        if let Some(device) = &self.device {
            settings.preferred_output_device = Some(device.clone());
        }
    }
}

fn value<I: Iterator<Item = String>>(it: &mut I, flag: &str) -> Result<String, String> {
    it.next().ok_or_else(|| format!("missing value for {flag}"))
}

fn number<T: std::str::FromStr, I: Iterator<Item = String>>(
    it: &mut I,
    flag: &str,
) -> Result<T, String> {
    value(it, flag)?
        .parse::<T>()
        .map_err(|_| format!("invalid value for {flag}"))
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut it = args.into_iter();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--settings" => parsed.settings = Some(PathBuf::from(value(&mut it, &arg)?)),
            "--format" => {
                let raw = value(&mut it, &arg)?;
                parsed.format = Some(raw.parse::<PcmFormat>().map_err(|e| e.to_string())?);
            }
            "--rate" => parsed.sample_rate = Some(number(&mut it, &arg)?),
            "--channels" => parsed.channels = Some(number(&mut it, &arg)?),
            "--chunk-bytes" => parsed.chunk_bytes = Some(number(&mut it, &arg)?),
            "--block-frames" => parsed.block_frames = Some(number(&mut it, &arg)?),
            "--device" => parsed.device = Some(value(&mut it, &arg)?),
            "--list-devices" => parsed.list_devices = true,
            "--save-settings" => parsed.save_settings = true,
            "--help" | "-h" => parsed.help = true,
            other if other.starts_with("--") => {
                return Err(format!("unknown argument: {other}"));
            }
            other => {
                if parsed.source.is_some() {
                    return Err(format!("unexpected extra source: {other}"));
                }
                parsed.source = Some(other.to_string());
            }
        }
    }

    Ok(parsed)
}
