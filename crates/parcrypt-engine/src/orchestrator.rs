//! Worker orchestration
//!
//! One task per chunk on a bounded rayon pool. Every task builds its own
//! cipher, opens its own reader and writes into a private output, so the only
//! state shared between workers is [`OperationState`]. The first failure is
//! kept; tasks that have not started yet see it and skip their work. After
//! the join every output is dropped if anything failed.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};

use parcrypt_chunks::ChunkTask;
use parcrypt_crypto::{CipherError, CipherFactory};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{ChunkFailure, ChunkFailureKind, EngineError};
use crate::progress::{OperationState, ProgressFn, ProgressReporter};
use crate::source::ChunkSource;

/// Chunks longer than this always go to a temp file instead of memory
pub const MEMORY_CHUNK_LIMIT: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Pool size; 1 runs every task on the calling thread
    pub workers: usize,
    /// Read buffer size per worker
    pub buffer_size: usize,
    /// Write every chunk output to an anonymous temp file
    pub spill_to_disk: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            buffer_size: 64 * 1024,
            spill_to_disk: false,
        }
    }
}

/// Private output of one finished chunk
#[derive(Debug)]
pub enum ChunkOutput {
    Memory(Vec<u8>),
    /// Anonymous temp file, removed by the OS once dropped
    Spilled { file: File, len: u64 },
}

impl ChunkOutput {
    pub fn len(&self) -> u64 {
        match self {
            ChunkOutput::Memory(bytes) => bytes.len() as u64,
            ChunkOutput::Spilled { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy this output into `writer`, returning the number of bytes copied.
    pub fn write_to<W: Write + ?Sized>(self, writer: &mut W) -> io::Result<u64> {
        match self {
            ChunkOutput::Memory(bytes) => {
                writer.write_all(&bytes)?;
                Ok(bytes.len() as u64)
            }
            ChunkOutput::Spilled { mut file, len } => {
                file.seek(SeekFrom::Start(0))?;
                let copied = io::copy(&mut file, writer)?;
                if copied != len {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("spilled chunk holds {copied} bytes, expected {len}"),
                    ));
                }
                Ok(copied)
            }
        }
    }
}

enum ChunkWriter {
    Memory(Vec<u8>),
    Spill { file: BufWriter<File>, len: u64 },
}

impl ChunkWriter {
    fn new(spill: bool, length: u64) -> io::Result<Self> {
        if spill || length > MEMORY_CHUNK_LIMIT {
            Ok(ChunkWriter::Spill {
                file: BufWriter::new(tempfile::tempfile()?),
                len: 0,
            })
        } else {
            // room for a padding block or GCM tag
            Ok(ChunkWriter::Memory(Vec::with_capacity(length as usize + 32)))
        }
    }

    /// Run `f` against the output; memory outputs are written in place.
    fn write_with<F>(&mut self, scratch: &mut Vec<u8>, f: F) -> Result<(), ChunkFailureKind>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), CipherError>,
    {
        match self {
            ChunkWriter::Memory(buf) => f(buf)?,
            ChunkWriter::Spill { file, len } => {
                scratch.clear();
                f(scratch)?;
                file.write_all(scratch)?;
                *len += scratch.len() as u64;
            }
        }
        Ok(())
    }

    fn finish(self) -> io::Result<ChunkOutput> {
        match self {
            ChunkWriter::Memory(buf) => Ok(ChunkOutput::Memory(buf)),
            ChunkWriter::Spill { file, len } => {
                let file = file.into_inner().map_err(io::IntoInnerError::into_error)?;
                Ok(ChunkOutput::Spilled { file, len })
            }
        }
    }
}

struct Worker<'a> {
    factory: &'a dyn CipherFactory,
    source: &'a dyn ChunkSource,
    options: &'a ExecuteOptions,
    state: &'a OperationState,
    reporter: &'a ProgressReporter,
}

impl Worker<'_> {
    fn run(&self, task: ChunkTask) -> Option<ChunkOutput> {
        if self.state.has_failed() {
            debug!(chunk = task.index, "skipping chunk after earlier failure");
            return None;
        }
        match self.process(&task) {
            Ok(Some(output)) => {
                let done = self.state.complete_chunk();
                debug!(
                    chunk = task.index,
                    offset = task.start_offset,
                    bytes_in = task.length,
                    bytes_out = output.len(),
                    completed = done,
                    "chunk complete"
                );
                self.reporter.report(self.state);
                Some(output)
            }
            Ok(None) => None,
            Err(kind) => {
                warn!(chunk = task.index, error = %kind, "chunk failed");
                self.state.record_failure(ChunkFailure {
                    index: task.index,
                    kind,
                });
                None
            }
        }
    }

    /// `Ok(None)` when the chunk was abandoned because another one failed.
    fn process(&self, task: &ChunkTask) -> Result<Option<ChunkOutput>, ChunkFailureKind> {
        let mut cipher = self
            .factory
            .create(task.derived_iv.as_deref(), task.is_final)?;
        let mut reader = self.source.open_at(task.start_offset)?;
        let mut writer = ChunkWriter::new(self.options.spill_to_disk, task.length)?;

        let mut buf = vec![0u8; self.options.buffer_size.max(1)];
        let mut scratch = Vec::new();
        let mut remaining = task.length;
        while remaining > 0 {
            if self.state.has_failed() {
                return Ok(None);
            }
            let want = remaining.min(buf.len() as u64) as usize;
            reader.read_exact(&mut buf[..want])?;
            writer.write_with(&mut scratch, |out| cipher.update(&buf[..want], out))?;
            remaining -= want as u64;
            self.state.add_processed(want as u64);
            self.reporter.report(self.state);
        }
        writer.write_with(&mut scratch, move |out| cipher.finish(out))?;
        Ok(Some(writer.finish()?))
    }
}

/// Run every task and return their outputs in task order.
///
/// On failure all outputs are dropped and the first chunk failure is returned
/// as [`EngineError::Aggregate`].
pub fn execute(
    tasks: Vec<ChunkTask>,
    factory: &dyn CipherFactory,
    source: &dyn ChunkSource,
    options: &ExecuteOptions,
    on_progress: Option<ProgressFn>,
) -> Result<Vec<ChunkOutput>, EngineError> {
    let total_chunks = tasks.len() as u32;
    let total_bytes = tasks.iter().map(|t| t.length).sum();
    let state = OperationState::new(total_chunks, total_bytes);
    let reporter = ProgressReporter::new(on_progress);
    let worker = Worker {
        factory,
        source,
        options,
        state: &state,
        reporter: &reporter,
    };

    info!(
        chunks = total_chunks,
        workers = options.workers,
        bytes = total_bytes,
        spill = options.spill_to_disk,
        "executing chunk plan"
    );

    let results: Vec<Option<ChunkOutput>> = if options.workers <= 1 || tasks.len() <= 1 {
        tasks.into_iter().map(|task| worker.run(task)).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .thread_name(|i| format!("parcrypt-worker-{i}"))
            .build()?;
        pool.install(|| {
            tasks
                .into_par_iter()
                .with_max_len(1)
                .map(|task| worker.run(task))
                .collect()
        })
    };
    reporter.finish(&state);

    let completed_chunks = state.completed_chunks();
    if let Some(failure) = state.into_failure() {
        warn!(
            chunk = failure.index,
            completed = completed_chunks,
            total = total_chunks,
            "discarding chunk outputs after failure"
        );
        drop(results);
        return Err(EngineError::Aggregate {
            source: Box::new(failure),
            completed_chunks,
        });
    }

    results
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| EngineError::Validation("chunk finished without output".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::reassemble;
    use crate::source::MemorySource;
    use parcrypt_core::Direction;
    use parcrypt_crypto::{lookup, BlockMode, ChunkCipher, KeyedCipherFactory, SecretKey};

    fn ctr_factory() -> KeyedCipherFactory {
        KeyedCipherFactory::new(
            lookup("aes-128").unwrap(),
            BlockMode::Ctr,
            Direction::Encrypt,
            SecretKey::from_bytes(vec![1; 16]),
            None,
        )
    }

    fn concat(outputs: Vec<ChunkOutput>) -> Vec<u8> {
        let mut out = Vec::new();
        reassemble(&mut out, outputs).unwrap();
        out
    }

    #[test]
    fn outputs_come_back_in_task_order() {
        let data: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();
        let source = MemorySource::new(data);
        let iv = vec![0u8; 16];
        let tasks: Vec<ChunkTask> = (0..4u32)
            .map(|i| {
                let offset = u64::from(i) * 1024;
                ChunkTask::new(i, offset, 1024, i == 3).with_iv(
                    parcrypt_crypto::derive_chunk_iv(&iv, 16, offset).unwrap(),
                )
            })
            .collect();
        let options = ExecuteOptions {
            workers: 4,
            buffer_size: 100,
            spill_to_disk: false,
        };
        let parallel = concat(execute(tasks, &ctr_factory(), &source, &options, None).unwrap());

        let single = vec![ChunkTask::whole(4096).with_iv(iv)];
        let sequential = concat(
            execute(single, &ctr_factory(), &source, &ExecuteOptions::default(), None).unwrap(),
        );
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn spilled_outputs_match_memory_outputs() {
        let source = MemorySource::new(vec![0xA5u8; 3000]);
        let tasks = || {
            vec![
                ChunkTask::new(0, 0, 1600, false).with_iv(vec![0; 16]),
                ChunkTask::new(1, 1600, 1400, true)
                    .with_iv(parcrypt_crypto::derive_chunk_iv(&[0; 16], 16, 1600).unwrap()),
            ]
        };
        let mut options = ExecuteOptions {
            workers: 2,
            buffer_size: 256,
            spill_to_disk: false,
        };
        let memory = concat(execute(tasks(), &ctr_factory(), &source, &options, None).unwrap());
        options.spill_to_disk = true;
        let outputs = execute(tasks(), &ctr_factory(), &source, &options, None).unwrap();
        assert!(matches!(outputs[0], ChunkOutput::Spilled { len: 1600, .. }));
        assert_eq!(concat(outputs), memory);
    }

    struct FailingFactory;

    impl CipherFactory for FailingFactory {
        fn create(
            &self,
            _iv: Option<&[u8]>,
            _is_final: bool,
        ) -> Result<Box<dyn ChunkCipher>, CipherError> {
            Err(CipherError::Unsupported("injected".into()))
        }
    }

    #[test]
    fn cipher_failure_becomes_aggregate_error() {
        let source = MemorySource::new(vec![0u8; 64]);
        let err = execute(
            vec![ChunkTask::whole(64)],
            &FailingFactory,
            &source,
            &ExecuteOptions::default(),
            None,
        )
        .unwrap_err();
        match err {
            EngineError::Aggregate {
                source,
                completed_chunks,
            } => {
                assert_eq!(source.index, 0);
                assert_eq!(completed_chunks, 0);
                assert!(matches!(source.kind, ChunkFailureKind::Cipher(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_task_still_finishes_cipher() {
        let factory = KeyedCipherFactory::new(
            lookup("aes-128").unwrap(),
            BlockMode::Cbc,
            Direction::Encrypt,
            SecretKey::from_bytes(vec![1; 16]),
            None,
        );
        let source = MemorySource::default();
        let outputs = execute(
            vec![ChunkTask::whole(0).with_iv(vec![0; 16])],
            &factory,
            &source,
            &ExecuteOptions::default(),
            None,
        )
        .unwrap();
        // one full block of PKCS#7 padding
        assert_eq!(outputs[0].len(), 16);
    }
}
