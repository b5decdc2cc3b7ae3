//! Chunk queue between the producer context and the render context.
//!
//! Two lock-free single-producer/single-consumer rings run in opposite
//! directions:
//!
//! ```text
//!             overflow (VecDeque, producer thread only)
//!                 │
//! ChunkProducer ──┴─ ringbuf HeapRb (SampleBlock) ──► ChunkConsumer
//!       ▲                                                  │
//!       └────── ringbuf HeapRb (retired SampleBlock) ◄─────┘
//! ```
//!
//! Both rings are allocated up front, so `pop_front` and `retire` are plain
//! wait-free `try_pop`/`try_push` calls. When the forward ring is full the
//! producer parks blocks in a local overflow list and moves them over on the
//! next `enqueue` or `flush`; from the caller's side the queue never rejects.
//! Exhausted blocks travel back on the return ring so their memory is
//! released on the producer thread instead of inside the audio callback.

pub mod block;

use std::collections::VecDeque;

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

pub use block::SampleBlock;

/// Default slot count for each ring. At 4096-sample blocks and 32 kHz this
/// is over two minutes of audio before the producer falls back to overflow.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Producer half. Owned by the non-real-time context that feeds audio.
pub struct ChunkProducer {
    tx: HeapProd<SampleBlock>,
    overflow: VecDeque<SampleBlock>,
    retired: HeapCons<SampleBlock>,
}

/// Consumer half. Owned by the render context.
pub struct ChunkConsumer {
    rx: HeapCons<SampleBlock>,
    retire: HeapProd<SampleBlock>,
}

/// Create a matched producer/consumer pair. `capacity` sizes both rings; it
/// bounds how far ahead the consumer can see, not how much can be enqueued.
pub fn create_chunk_queue(capacity: usize) -> (ChunkProducer, ChunkConsumer) {
    let capacity = capacity.max(1);
    let (tx, rx) = HeapRb::<SampleBlock>::new(capacity).split();
    let (retire, retired) = HeapRb::<SampleBlock>::new(capacity).split();
    (
        ChunkProducer {
            tx,
            overflow: VecDeque::new(),
            retired,
        },
        ChunkConsumer { rx, retire },
    )
}

impl ChunkProducer {
    /// Append a block to the tail of the queue and return its length.
    ///
    /// Total: a full ring only delays the block until a later `enqueue` or
    /// `flush` finds room. Order is preserved either way.
    pub fn enqueue(&mut self, block: impl Into<SampleBlock>) -> usize {
        let block = block.into();
        let len = block.len();
        self.overflow.push_back(block);
        self.flush();
        len
    }

    /// Release retired blocks and move as much overflow as fits into the
    /// ring. Returns the number of blocks still held back.
    pub fn flush(&mut self) -> usize {
        self.collect_retired();
        while let Some(block) = self.overflow.pop_front() {
            if let Err(block) = self.tx.try_push(block) {
                self.overflow.push_front(block);
                break;
            }
        }
        self.overflow.len()
    }

    /// Drop every block the render context has handed back. Returns how
    /// many were released.
    pub fn collect_retired(&mut self) -> usize {
        let mut released = 0;
        while self.retired.try_pop().is_some() {
            released += 1;
        }
        released
    }

    /// Blocks not yet picked up by the cursor, including held-back overflow
    /// (excluding the one the cursor is draining).
    pub fn queued_blocks(&self) -> usize {
        self.tx.occupied_len() + self.overflow.len()
    }

    /// Blocks waiting on the producer side for ring space.
    pub fn held_back(&self) -> usize {
        self.overflow.len()
    }
}

impl ChunkConsumer {
    /// Remove and return the head block, or `None` if the queue is empty.
    /// Never blocks.
    pub fn pop_front(&mut self) -> Option<SampleBlock> {
        self.rx.try_pop()
    }

    /// Hand an exhausted block back to the producer side for release.
    ///
    /// Returns `false` when the return lane is full; the block is then
    /// dropped here.
    pub fn retire(&mut self, block: SampleBlock) -> bool {
        self.retire.try_push(block).is_ok()
    }

    /// Discard every queued block. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
