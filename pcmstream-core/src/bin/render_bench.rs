//! Render-path latency benchmark.
//!
//! Feeds synthetic block patterns through a `RenderCursor` and reports how
//! long each `render` call takes.
//!
//! ```text
//! cargo run --release -p pcmstream-core --bin render_bench -- \
//!   [--renders <n>] [--block <samples>] [--output <file.json>]
//! ```

use std::path::PathBuf;
use std::time::Instant;

use pcmstream_core::{create_chunk_queue, RenderCursor};
use serde::Serialize;

#[derive(Debug)]
struct Args {
    renders: usize,
    block: usize,
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
struct ScenarioSummary {
    scenario: String,
    chunk_len: usize,
    renders: usize,
    underruns: usize,
    p50_render_us: f64,
    p95_render_us: f64,
    max_render_us: f64,
    discarded_blocks: usize,
}

#[derive(Debug, Clone, Serialize)]
struct Summary {
    output_block: usize,
    renders_per_scenario: usize,
    scenarios: Vec<ScenarioSummary>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("render_bench failed: {e}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Args, String> {
    let mut renders: usize = 20_000;
    let mut block: usize = 128;
    let mut output: Option<PathBuf> = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--renders" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --renders".into());
                };
                renders = v
                    .parse::<usize>()
                    .map_err(|_| "invalid value for --renders".to_string())?
                    .clamp(1, 10_000_000);
            }
            "--block" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --block".into());
                };
                block = v
                    .parse::<usize>()
                    .map_err(|_| "invalid value for --block".to_string())?
                    .clamp(1, 65_536);
            }
            "--output" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --output".into());
                };
                output = Some(PathBuf::from(v));
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run --release -p pcmstream-core --bin render_bench -- \\
  [--renders <n>] [--block <samples>] [--output <file.json>]"
                );
                std::process::exit(0);
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    Ok(Args {
        renders,
        block,
        output,
    })
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Queue enough `chunk_len` blocks to cover `renders` output blocks, then
/// time every render. `chunk_len == 0` measures the pure underrun path.
fn run_scenario(name: &str, chunk_len: usize, block: usize, renders: usize) -> ScenarioSummary {
    let (mut producer, consumer) = create_chunk_queue(1024);
    let mut cursor = RenderCursor::new(consumer);

    if chunk_len > 0 {
        let total = block * renders;
        let mut queued = 0usize;
        let mut phase = 0f32;
        while queued < total {
            let samples: Vec<f32> = (0..chunk_len)
                .map(|_| {
                    phase = (phase + 0.01) % 1.0;
                    phase * 2.0 - 1.0
                })
                .collect();
            queued += producer.enqueue(samples);
        }
    }

    let mut out = vec![0f32; block];
    let mut latencies = Vec::with_capacity(renders);
    let mut underruns = 0usize;
    for _ in 0..renders {
        let t0 = Instant::now();
        let report = cursor.render(&mut out);
        latencies.push(t0.elapsed().as_secs_f64() * 1_000_000.0);
        if report.is_underrun() {
            underruns += 1;
        }
        // Refill and release outside the timed region, as the producer
        // thread would.
        producer.flush();
    }

    ScenarioSummary {
        scenario: name.to_string(),
        chunk_len,
        renders,
        underruns,
        p50_render_us: percentile(&latencies, 0.50),
        p95_render_us: percentile(&latencies, 0.95),
        max_render_us: latencies.iter().copied().fold(0.0, f64::max),
        discarded_blocks: cursor.clear(),
    }
}

fn run() -> Result<(), String> {
    let args = parse_args()?;

    let scenarios = [
        ("aligned", args.block),
        ("pipe_4096", 4096),
        ("tiny_7", 7),
        ("odd_1000", 1000),
        ("underrun", 0),
    ];

    let results: Vec<ScenarioSummary> = scenarios
        .iter()
        .map(|(name, chunk_len)| {
            let summary = run_scenario(name, *chunk_len, args.block, args.renders);
            println!(
                "{:<10} p50={:.2}us p95={:.2}us max={:.2}us underruns={}",
                summary.scenario,
                summary.p50_render_us,
                summary.p95_render_us,
                summary.max_render_us,
                summary.underruns
            );
            summary
        })
        .collect();

    let summary = Summary {
        output_block: args.block,
        renders_per_scenario: args.renders,
        scenarios: results,
    };

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote benchmark report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
