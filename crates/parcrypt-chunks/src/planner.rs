//! Fixed-size chunk planning
//!
//! Splits a payload into at most `worker_count` contiguous ranges. Every range
//! starts on a multiple of the cipher block size so counter-style modes can
//! derive the starting counter of each chunk from its offset alone.
//!
//! Chunk size:
//!   chunk = max(min_chunk, ceil(payload / workers)), rounded up to the block
//!   size, never larger than the payload.
//!
//! Payloads of `min_chunk * workers` bytes or fewer are not split at all.

/// One contiguous byte range of the payload, processed by a single worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTask {
    /// Position in reassembly order
    pub index: u32,
    /// Byte offset within the payload (after any header)
    pub start_offset: u64,
    /// Range length in bytes
    pub length: u64,
    /// Starting IV/counter for this range, filled in by the engine
    pub derived_iv: Option<Vec<u8>>,
    /// Last range of the payload (carries padding/tag for modes that have one)
    pub is_final: bool,
}

impl ChunkTask {
    pub fn new(index: u32, start_offset: u64, length: u64, is_final: bool) -> Self {
        Self {
            index,
            start_offset,
            length,
            derived_iv: None,
            is_final,
        }
    }

    /// A single task covering the whole payload (the sequential path).
    pub fn whole(payload_size: u64) -> Self {
        Self::new(0, 0, payload_size, true)
    }

    pub fn with_iv(mut self, iv: Vec<u8>) -> Self {
        self.derived_iv = Some(iv);
        self
    }

    /// Exclusive end offset
    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.length
    }
}

/// Whether a payload is large enough to be worth splitting across workers.
pub fn should_parallelize(payload_size: u64, worker_count: usize, min_chunk_size: u64) -> bool {
    worker_count > 1 && payload_size > min_chunk_size.saturating_mul(worker_count as u64)
}

/// Plan chunk ranges for `payload_size` bytes.
///
/// Returns an empty plan for an empty payload. Every task except the last has
/// a length that is a multiple of `block_size`; the last one may be shorter.
pub fn plan_chunks(
    payload_size: u64,
    block_size: usize,
    worker_count: usize,
    min_chunk_size: u64,
) -> Vec<ChunkTask> {
    if payload_size == 0 {
        return Vec::new();
    }

    if !should_parallelize(payload_size, worker_count, min_chunk_size) {
        return vec![ChunkTask::whole(payload_size)];
    }

    let chunk_size = chunk_size_for(payload_size, block_size, worker_count, min_chunk_size);
    let count = payload_size.div_ceil(chunk_size);

    let tasks: Vec<ChunkTask> = (0..count)
        .map(|i| {
            let start = i * chunk_size;
            let length = (payload_size - start).min(chunk_size);
            ChunkTask::new(i as u32, start, length, i + 1 == count)
        })
        .collect();

    tracing::debug!(
        payload_size,
        block_size,
        worker_count,
        chunk_size,
        chunks = tasks.len(),
        "planned chunks"
    );
    tasks
}

fn chunk_size_for(payload_size: u64, block_size: usize, worker_count: usize, min_chunk: u64) -> u64 {
    let block = block_size.max(1) as u64;
    let even_share = payload_size.div_ceil(worker_count.max(1) as u64);
    let aligned = even_share.max(min_chunk).div_ceil(block) * block;
    aligned.min(payload_size).max(1)
}
