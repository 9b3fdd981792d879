//! Shared operation state and progress delivery
//!
//! Workers only ever add to the counters and try to set the error slot. The
//! reporter reads a snapshot under a try-lock so the caller's callback sees
//! `bytes_processed` rise monotonically even though updates come from many
//! threads.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::Serialize;

use crate::error::ChunkFailure;

/// Progress callback, invoked from worker threads
pub type ProgressFn = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Point-in-time view of an operation's progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// 0..=100, derived from bytes only
    pub percentage: u8,
    pub bytes_processed: u64,
    pub total_bytes: u64,
    pub chunks_completed: u32,
    pub total_chunks: u32,
}

/// Counters shared by all workers of one operation
#[derive(Debug)]
pub struct OperationState {
    processed_bytes: AtomicU64,
    completed_chunks: AtomicU32,
    total_chunks: u32,
    total_bytes: u64,
    first_error: OnceLock<ChunkFailure>,
}

impl OperationState {
    pub fn new(total_chunks: u32, total_bytes: u64) -> Self {
        Self {
            processed_bytes: AtomicU64::new(0),
            completed_chunks: AtomicU32::new(0),
            total_chunks,
            total_bytes,
            first_error: OnceLock::new(),
        }
    }

    pub fn add_processed(&self, bytes: u64) -> u64 {
        self.processed_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes
    }

    pub fn complete_chunk(&self) -> u32 {
        self.completed_chunks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Record a failure. Returns false if another failure was recorded first.
    pub fn record_failure(&self, failure: ChunkFailure) -> bool {
        self.first_error.set(failure).is_ok()
    }

    pub fn has_failed(&self) -> bool {
        self.first_error.get().is_some()
    }

    pub fn completed_chunks(&self) -> u32 {
        self.completed_chunks.load(Ordering::Acquire)
    }

    /// Consume the state, returning the first recorded failure.
    pub fn into_failure(self) -> Option<ChunkFailure> {
        self.first_error.into_inner()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let bytes_processed = self.processed_bytes.load(Ordering::Relaxed);
        let chunks_completed = self.completed_chunks.load(Ordering::Acquire);
        let percentage = if self.total_bytes == 0 {
            if chunks_completed >= self.total_chunks {
                100
            } else {
                0
            }
        } else {
            (bytes_processed.min(self.total_bytes) * 100 / self.total_bytes) as u8
        };
        ProgressSnapshot {
            percentage,
            bytes_processed,
            total_bytes: self.total_bytes,
            chunks_completed,
            total_chunks: self.total_chunks,
        }
    }
}

/// Serializes delivery of snapshots to the caller's callback
pub struct ProgressReporter {
    callback: Option<ProgressFn>,
    // bytes_processed of the last delivered snapshot
    last: Mutex<u64>,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressFn>) -> Self {
        Self {
            callback,
            last: Mutex::new(0),
        }
    }

    /// Deliver a snapshot if no other thread is delivering one right now.
    ///
    /// A skipped update is superseded by the next one, or by [`finish`](Self::finish).
    pub fn report(&self, state: &OperationState) {
        let Some(callback) = &self.callback else {
            return;
        };
        if let Ok(mut last) = self.last.try_lock() {
            let snapshot = state.snapshot();
            if snapshot.bytes_processed >= *last {
                *last = snapshot.bytes_processed;
                callback(snapshot);
            }
        }
    }

    /// Always deliver the final snapshot, waiting for any in-flight delivery.
    pub fn finish(&self, state: &OperationState) -> ProgressSnapshot {
        let Some(callback) = &self.callback else {
            return state.snapshot();
        };
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = state.snapshot();
        *last = snapshot.bytes_processed;
        callback(snapshot);
        snapshot
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChunkFailureKind;
    use std::io;

    #[test]
    fn percentage_follows_bytes() {
        let state = OperationState::new(4, 1000);
        assert_eq!(state.snapshot().percentage, 0);
        state.add_processed(250);
        assert_eq!(state.snapshot().percentage, 25);
        state.add_processed(750);
        let snap = state.snapshot();
        assert_eq!(snap.percentage, 100);
        assert_eq!(snap.chunks_completed, 0, "chunks do not drive percentage");
    }

    #[test]
    fn empty_payload_completes_on_last_chunk() {
        let state = OperationState::new(1, 0);
        assert_eq!(state.snapshot().percentage, 0);
        state.complete_chunk();
        assert_eq!(state.snapshot().percentage, 100);
    }

    #[test]
    fn first_failure_wins() {
        let state = OperationState::new(2, 10);
        let fail = |index| ChunkFailure {
            index,
            kind: ChunkFailureKind::Io(io::Error::new(io::ErrorKind::Other, "boom")),
        };
        assert!(!state.has_failed());
        assert!(state.record_failure(fail(1)));
        assert!(!state.record_failure(fail(0)));
        assert!(state.has_failed());
        assert_eq!(state.into_failure().unwrap().index, 1);
    }

    #[test]
    fn reporter_is_monotonic_across_threads() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::new(Some(Arc::new(move |s: ProgressSnapshot| {
            sink.lock().unwrap().push(s.bytes_processed);
        })));
        let state = OperationState::new(8, 8 * 1000);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        state.add_processed(10);
                        reporter.report(&state);
                    }
                });
            }
        });
        let last = reporter.finish(&state);

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards");
        assert_eq!(*seen.last().unwrap(), 8000);
        assert_eq!(last.percentage, 100);
    }
}
