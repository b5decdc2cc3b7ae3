use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use pcmstream_core::{create_chunk_queue, ChunkProducer, PcmStream, RenderCursor, StreamConfig};
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Blocks whose samples count up from 1 across all blocks, so order and gaps
/// are visible.
fn counting_blocks(lengths: &[usize]) -> Vec<Vec<f32>> {
    let mut next = 1usize;
    lengths
        .iter()
        .map(|&len| {
            let block = (next..next + len).map(|v| v as f32).collect();
            next += len;
            block
        })
        .collect()
}

/// Render until `expected` samples came out or the queue is dry with nothing
/// held back on the producer side.
fn drain_all(
    producer: &mut ChunkProducer,
    cursor: &mut RenderCursor,
    block: usize,
    expected: usize,
) -> Vec<f32> {
    let mut drained = Vec::with_capacity(expected);
    let mut out = vec![0f32; block];
    while drained.len() < expected {
        let held_back = producer.flush();
        let report = cursor.render(&mut out);
        drained.extend_from_slice(&out[..report.filled]);
        if report.filled == 0 && held_back == 0 {
            break;
        }
    }
    drained
}

#[test]
fn drained_output_is_concatenation_of_blocks() {
    let mut rng = SmallRng::seed_from_u64(7);
    let lengths: Vec<usize> = (0..200).map(|_| rng.gen_range(0..300)).collect();
    let blocks = counting_blocks(&lengths);
    let expected: Vec<f32> = blocks.iter().flatten().copied().collect();

    for output_len in [1usize, 3, 64, 128, 441, 4096] {
        let (mut producer, consumer) = create_chunk_queue(16);
        let mut cursor = RenderCursor::new(consumer);
        for block in &blocks {
            producer.enqueue(block.clone());
        }

        let drained = drain_all(&mut producer, &mut cursor, output_len, expected.len());
        assert_eq!(drained.len(), expected.len(), "output_len={output_len}");
        assert_eq!(drained, expected, "output_len={output_len}");
    }
}

#[test]
fn underrun_tail_is_zero_and_stays_zero() {
    let (mut producer, consumer) = create_chunk_queue(16);
    let mut cursor = RenderCursor::new(consumer);
    producer.enqueue(vec![0.9; 5]);

    let mut out = [1.0f32; 8];
    let report = cursor.render(&mut out);
    assert_eq!(report.filled, 5);
    assert_eq!(&out[..5], &[0.9; 5]);
    assert_eq!(&out[5..], &[0.0; 3]);

    for _ in 0..1000 {
        out.fill(1.0);
        cursor.render(&mut out);
        assert_eq!(out, [0.0; 8]);
    }
}

#[test]
fn concurrent_producer_preserves_order_without_loss() {
    let (mut producer, consumer) = create_chunk_queue(64);
    let mut cursor = RenderCursor::new(consumer);

    let mut rng = SmallRng::seed_from_u64(42);
    let lengths: Vec<usize> = (0..2_000).map(|_| rng.gen_range(1..=512)).collect();
    let total: usize = lengths.iter().sum();
    let blocks = counting_blocks(&lengths);

    let producer_thread = thread::spawn(move || {
        for (idx, block) in blocks.into_iter().enumerate() {
            producer.enqueue(block);
            if idx % 50 == 0 {
                thread::yield_now();
            }
        }
        while producer.flush() > 0 {
            thread::sleep(Duration::from_micros(200));
        }
        producer
    });

    // Consumer: fixed 256-sample periods, never waits on the producer.
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut drained = Vec::with_capacity(total);
    let mut out = [0f32; 256];
    while drained.len() < total {
        assert!(Instant::now() < deadline, "timed out draining queue");
        let report = cursor.render(&mut out);
        drained.extend_from_slice(&out[..report.filled]);
        if report.filled == 0 {
            thread::sleep(Duration::from_micros(200));
        }
    }

    let mut producer = producer_thread.join().expect("producer thread panicked");
    producer.collect_retired();

    assert_eq!(drained.len(), total);
    for (idx, sample) in drained.iter().enumerate() {
        assert_eq!(*sample, (idx + 1) as f32, "sample {idx} out of order");
    }
}

#[test]
fn external_driver_renders_stream_until_stop() {
    let stream = PcmStream::new(StreamConfig::default());
    let mut cursor = stream.start_with_driver().expect("start stream");

    let lengths = [4096usize, 17, 0, 1000, 333];
    let total: usize = lengths.iter().sum();
    for block in counting_blocks(&lengths) {
        stream.enqueue(block).expect("enqueue");
    }

    let done = Arc::new(AtomicBool::new(false));
    let driver_done = Arc::clone(&done);
    let driver = thread::spawn(move || {
        let mut drained = Vec::new();
        let mut out = [0f32; 128];
        while !driver_done.load(Ordering::Acquire) {
            let report = cursor.render(&mut out);
            drained.extend_from_slice(&out[..report.filled]);
            thread::sleep(Duration::from_micros(100));
        }
        drained
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while stream.diagnostics_snapshot().samples_rendered < total {
        assert!(Instant::now() < deadline, "driver did not drain the queue");
        thread::sleep(Duration::from_millis(1));
    }
    done.store(true, Ordering::Release);
    let drained = driver.join().expect("driver thread panicked");
    stream.stop().expect("stop stream");

    assert_eq!(drained.len(), total);
    assert!(drained.iter().enumerate().all(|(i, s)| *s == (i + 1) as f32));

    let diag = stream.diagnostics_snapshot();
    assert_eq!(diag.blocks_enqueued, lengths.len());
    assert_eq!(diag.samples_enqueued, total);
    assert_eq!(diag.pending_samples(), 0);
    assert!(diag.underruns > 0, "driver kept rendering after the queue emptied");
}
