//! pcmstream command-line player.
//!
//! Reads raw PCM from a FIFO, file or stdin and plays it on the default (or
//! preferred) output device until the source ends or Ctrl-C.

mod cli;
mod player;
mod settings;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use pcmstream_core::{audio::device::list_output_devices, PcmStream};
use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use tokio::sync::{broadcast::error::RecvError, oneshot};
use tracing::{error, info, warn};

const FLUSH_INTERVAL: Duration = Duration::from_millis(20);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pcmstream=info,pcmstream_core=info")),
        )
        .init();

    let args = match cli::parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n\n{}", cli::USAGE);
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{}", cli::USAGE);
        return Ok(());
    }
    if args.list_devices {
        for device in list_output_devices() {
            let marker = if device.is_default { "*" } else { " " };
            let rate = device
                .default_sample_rate
                .map(|r| format!("{r} Hz"))
                .unwrap_or_else(|| "? Hz".into());
            let channels = device
                .default_channels
                .map(|c| format!("{c} ch"))
                .unwrap_or_else(|| "? ch".into());
            println!("{marker} {}  ({rate}, {channels})", device.name);
        }
        return Ok(());
    }

    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    args.apply_to(&mut settings);
    settings.normalize();
    if args.save_settings {
        save_settings(&settings_path, &settings)
            .with_context(|| format!("failed to save {}", settings_path.display()))?;
        info!(path = %settings_path.display(), "settings saved");
    }

    let stream = Arc::new(PcmStream::new(settings.stream_config()));
    spawn_status_logger(&stream);
    stream.start().context("failed to open audio output")?;
    spawn_stats_logger(&stream, settings.stats_interval_secs);
    spawn_flusher(&stream);

    let running = Arc::new(AtomicBool::new(true));
    let mut source_done = spawn_source(settings.clone(), Arc::clone(&stream), Arc::clone(&running))?;

    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            false
        }
        outcome = &mut source_done => {
            match outcome {
                Ok(Ok(blocks)) => info!(blocks, "source finished"),
                Ok(Err(e)) => error!("source failed: {e:#}"),
                Err(_) => error!("source thread exited without reporting"),
            }
            true
        }
    };

    if finished {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupted while draining"),
            _ = wait_for_drain(&stream) => info!("queue drained"),
        }
    }

    running.store(false, Ordering::Relaxed);
    if stream.is_running() {
        stream.stop()?;
    }
    Ok(())
}

/// Read the source on its own thread. FIFO opens and stdin reads block, so
/// the thread is left detached on shutdown rather than joined.
fn spawn_source(
    settings: AppSettings,
    stream: Arc<PcmStream>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<oneshot::Receiver<anyhow::Result<usize>>> {
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("pcm-source".into())
        .spawn(move || {
            let outcome = player::run_source(&settings, &stream, &running);
            let _ = tx.send(outcome);
        })
        .context("failed to spawn source thread")?;
    Ok(rx)
}

async fn wait_for_drain(stream: &PcmStream) {
    let mut tick = tokio::time::interval(Duration::from_millis(50));
    loop {
        tick.tick().await;
        if stream.diagnostics_snapshot().pending_samples() == 0 {
            return;
        }
    }
}

/// Keep blocks held back by a full queue ring moving while the source is
/// blocked in a read.
fn spawn_flusher(stream: &Arc<PcmStream>) {
    let stream = Arc::clone(stream);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            tick.tick().await;
            if !stream.is_running() {
                break;
            }
            stream.flush();
        }
    });
}

fn spawn_status_logger(stream: &PcmStream) {
    let mut rx = stream.subscribe_status();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.detail {
                    Some(detail) => info!(status = ?event.status, "{detail}"),
                    None => info!(status = ?event.status, "stream status"),
                },
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "status events lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_stats_logger(stream: &Arc<PcmStream>, interval_secs: u64) {
    if interval_secs == 0 {
        return;
    }
    let mut acks = stream.subscribe_chunks();
    let stream = Arc::clone(stream);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(interval_secs));
        tick.tick().await;
        let mut chunks = 0u64;
        let mut samples = 0usize;
        let mut last_seq = 0u64;
        loop {
            tokio::select! {
                ack = acks.recv() => match ack {
                    Ok(ack) => {
                        chunks += 1;
                        samples += ack.size;
                        last_seq = ack.seq;
                    }
                    Err(RecvError::Lagged(n)) => chunks += n,
                    Err(RecvError::Closed) => break,
                },
                _ = tick.tick() => {
                    if !stream.is_running() {
                        break;
                    }
                    let diag = stream.diagnostics_snapshot();
                    info!(
                        chunks,
                        samples,
                        last_seq,
                        pending = diag.pending_samples(),
                        underruns = diag.underruns,
                        "playback stats"
                    );
                    chunks = 0;
                    samples = 0;
                }
            }
        }
    });
}
