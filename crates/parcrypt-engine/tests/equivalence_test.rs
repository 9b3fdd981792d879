//! Split execution must produce byte-identical output to a single pass, and
//! any chunk failure must fail the whole run.

use std::io::{self, Read};

use parcrypt_chunks::ChunkTask;
use parcrypt_core::Direction;
use parcrypt_crypto::{lookup, BlockMode, KeyedCipherFactory, SecretKey};
use parcrypt_engine::{
    build_tasks, execute, reassemble, ChunkFailureKind, ChunkSource, EngineError, ExecuteOptions,
    MemorySource,
};
use proptest::prelude::*;

fn factory(id: &str, mode: BlockMode, direction: Direction) -> KeyedCipherFactory {
    let spec = lookup(id).unwrap();
    let key: Vec<u8> = (0..spec.key_len()).map(|i| i as u8 ^ 0x5C).collect();
    KeyedCipherFactory::new(spec, mode, direction, SecretKey::from_bytes(key), None)
}

fn run(
    id: &str,
    mode: BlockMode,
    direction: Direction,
    input: &[u8],
    base_iv: Option<&[u8]>,
    workers: usize,
    min_chunk: u64,
) -> Vec<u8> {
    let spec = lookup(id).unwrap();
    let parallel = workers > 1;
    let tasks =
        build_tasks(spec, mode, input.len() as u64, base_iv, parallel, workers, min_chunk).unwrap();
    let options = ExecuteOptions {
        workers,
        buffer_size: 97,
        spill_to_disk: false,
    };
    let source = MemorySource::new(input.to_vec());
    let outputs = execute(tasks, &factory(id, mode, direction), &source, &options, None).unwrap();
    let mut out = Vec::new();
    reassemble(&mut out, outputs).unwrap();
    out
}

fn base_iv(seed: u8) -> Vec<u8> {
    // top byte stays clear of the 128-bit counter ceiling
    let mut iv: Vec<u8> = (0..16u8).map(|i| i.wrapping_mul(seed) ^ 0xA7).collect();
    iv[0] = 0;
    iv
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn ctr_parallel_matches_sequential(
        data in proptest::collection::vec(any::<u8>(), 0..20_000),
        workers in 2usize..9,
        algo in prop::sample::select(vec!["aes-128", "aes-256", "twofish-256"]),
        seed in any::<u8>(),
        min_chunk in 1u64..4096,
    ) {
        let iv = base_iv(seed);
        let sequential = run(algo, BlockMode::Ctr, Direction::Encrypt, &data, Some(&iv), 1, min_chunk);
        let parallel =
            run(algo, BlockMode::Ctr, Direction::Encrypt, &data, Some(&iv), workers, min_chunk);
        prop_assert_eq!(&parallel, &sequential);
        prop_assert_eq!(parallel.len(), data.len());
    }

    #[test]
    fn ecb_parallel_matches_sequential(
        data in proptest::collection::vec(any::<u8>(), 0..20_000),
        workers in 2usize..9,
        algo in prop::sample::select(vec!["aes-128", "aes-192", "twofish-256"]),
        min_chunk in 1u64..4096,
    ) {
        let sequential = run(algo, BlockMode::Ecb, Direction::Encrypt, &data, None, 1, min_chunk);
        let parallel = run(algo, BlockMode::Ecb, Direction::Encrypt, &data, None, workers, min_chunk);
        prop_assert_eq!(&parallel, &sequential);
        prop_assert_eq!(parallel.len(), (data.len() / 16 + 1) * 16);
    }
}

#[test]
fn parallel_decrypt_reads_sequential_ciphertext() {
    let plaintext: Vec<u8> = (0..70_001u32).map(|i| (i % 251) as u8).collect();
    let iv = base_iv(3);

    let ctr = run("aes-256", BlockMode::Ctr, Direction::Encrypt, &plaintext, Some(&iv), 1, 256);
    assert_eq!(
        run("aes-256", BlockMode::Ctr, Direction::Decrypt, &ctr, Some(&iv), 6, 256),
        plaintext
    );

    let ecb = run("twofish-256", BlockMode::Ecb, Direction::Encrypt, &plaintext, None, 1, 256);
    assert_eq!(
        run("twofish-256", BlockMode::Ecb, Direction::Decrypt, &ecb, None, 6, 256),
        plaintext
    );
}

/// Fails the reader for the chunk starting at `fail_at`
struct FailingSource {
    inner: MemorySource,
    fail_at: u64,
    mid_read: bool,
}

struct BrokenReader<'a> {
    inner: Box<dyn Read + Send + 'a>,
    left: usize,
}

impl Read for BrokenReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.left == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "disk went away"));
        }
        let n = buf.len().min(self.left);
        let read = self.inner.read(&mut buf[..n])?;
        self.left -= read;
        Ok(read)
    }
}

impl ChunkSource for FailingSource {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn open_at(&self, offset: u64) -> io::Result<Box<dyn Read + Send + '_>> {
        let reader = self.inner.open_at(offset)?;
        if offset != self.fail_at {
            return Ok(reader);
        }
        if self.mid_read {
            Ok(Box::new(BrokenReader {
                inner: reader,
                left: 100,
            }))
        } else {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "open refused"))
        }
    }
}

fn four_tasks() -> Vec<ChunkTask> {
    let iv = base_iv(1);
    build_tasks(lookup("aes-128").unwrap(), BlockMode::Ctr, 4096, Some(&iv), true, 4, 512).unwrap()
}

#[test]
fn io_failure_in_one_chunk_fails_the_run() {
    for mid_read in [false, true] {
        let tasks = four_tasks();
        assert_eq!(tasks.len(), 4);
        let source = FailingSource {
            inner: MemorySource::new(vec![7u8; 4096]),
            fail_at: tasks[2].start_offset,
            mid_read,
        };
        let options = ExecuteOptions {
            workers: 4,
            buffer_size: 64,
            spill_to_disk: false,
        };
        let err = execute(
            tasks,
            &factory("aes-128", BlockMode::Ctr, Direction::Encrypt),
            &source,
            &options,
            None,
        )
        .unwrap_err();

        let failure = err.chunk_failure().expect("aggregate error");
        assert_eq!(failure.index, 2, "mid_read={mid_read}");
        assert!(matches!(failure.kind, ChunkFailureKind::Io(_)));
    }
}

#[test]
fn later_chunks_are_skipped_after_a_failure() {
    let tasks = four_tasks();
    let source = FailingSource {
        inner: MemorySource::new(vec![7u8; 4096]),
        fail_at: tasks[1].start_offset,
        mid_read: false,
    };
    // one worker runs tasks in order, so exactly chunk 0 completes
    let err = execute(
        tasks,
        &factory("aes-128", BlockMode::Ctr, Direction::Encrypt),
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
            assert_eq!(source.index, 1);
            assert_eq!(completed_chunks, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
