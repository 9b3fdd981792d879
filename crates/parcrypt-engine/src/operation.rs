//! One encrypt or decrypt operation, end to end
//!
//! validate → header (generate or read) → KDF → plan → execute → reassemble
//! into a temp file next to the destination → persist on success.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parcrypt_chunks::{effective_workers, plan_chunks, should_parallelize, ChunkTask};
use parcrypt_core::config::ParcryptConfig;
use parcrypt_core::Direction;
use parcrypt_crypto::{
    derive_chunk_iv, derive_key_material, is_padded, is_parallelizable, iv_len, random_bytes,
    require, AlgorithmSpec, BlockMode, KdfAlgorithm, KdfParams, KeyedCipherFactory,
    GCM_TAG_LEN,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::framing::{read_header, reassemble, write_header, FileHeader};
use crate::orchestrator::{execute, ExecuteOptions};
use crate::progress::ProgressFn;
use crate::source::{ChunkSource, FileSource};

/// Largest GCM plaintext accepted. GCM holds the whole payload in memory
/// until the tag is computed or verified.
pub const GCM_MAX_PAYLOAD: u64 = 256 * 1024 * 1024;

/// Everything one operation needs, fixed before it starts
#[derive(Debug)]
pub struct OperationConfig {
    pub direction: Direction,
    pub algorithm: &'static AlgorithmSpec,
    pub mode: BlockMode,
    pub password: SecretString,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub worker_count: usize,
    pub parallelism_enabled: bool,
    pub min_chunk_size: u64,
    pub buffer_size: usize,
    pub kdf: KdfParams,
    pub salt_len: usize,
    pub spill_to_disk: bool,
}

impl OperationConfig {
    /// A config with engine defaults for everything but the essentials.
    pub fn new(
        direction: Direction,
        algorithm: &'static AlgorithmSpec,
        mode: BlockMode,
        password: SecretString,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            direction,
            algorithm,
            mode,
            password,
            input_path: input_path.into(),
            output_path: output_path.into(),
            worker_count: effective_workers(0),
            parallelism_enabled: true,
            min_chunk_size: 64 * 1024,
            buffer_size: 64 * 1024,
            kdf: KdfParams::default(),
            salt_len: 16,
            spill_to_disk: false,
        }
    }

    /// Build from a loaded `parcrypt.toml`.
    pub fn from_config(
        config: &ParcryptConfig,
        direction: Direction,
        password: SecretString,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Result<Self, EngineError> {
        let algorithm = require(&config.crypto.algorithm)?;
        let mode: BlockMode = config.crypto.mode.parse()?;
        let kdf = match config.crypto.kdf.parse::<KdfAlgorithm>()? {
            KdfAlgorithm::Pbkdf2Sha256 => KdfParams::pbkdf2(config.crypto.pbkdf2_iterations),
            KdfAlgorithm::Argon2id => KdfParams::argon2id(
                config.crypto.argon2_mem_cost_kib,
                config.crypto.argon2_time_cost,
                config.crypto.argon2_parallelism,
            ),
        };
        Ok(Self {
            worker_count: effective_workers(config.engine.workers),
            parallelism_enabled: config.engine.parallel,
            min_chunk_size: config.min_chunk_bytes(),
            buffer_size: config.buffer_bytes(),
            kdf,
            salt_len: config.crypto.salt_len,
            spill_to_disk: config.engine.spill_to_disk,
            ..Self::new(direction, algorithm, mode, password, input_path, output_path)
        })
    }

    /// Checks that need no worker. Runs before anything touches the output.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: String| Err(EngineError::Validation(msg));

        if !self.algorithm.supports(self.mode) {
            let modes: Vec<&str> = self
                .algorithm
                .supported_modes
                .iter()
                .map(|m| m.as_str())
                .collect();
            return invalid(format!(
                "{} does not support mode {} (supported: {})",
                self.algorithm.id,
                self.mode,
                modes.join(", ")
            ));
        }
        if self.password.expose_secret().is_empty() {
            return invalid("password must not be empty".into());
        }
        if self.worker_count == 0 {
            return invalid("worker count must be >= 1".into());
        }
        if self.buffer_size == 0 {
            return invalid("buffer size must be >= 1".into());
        }
        if self.min_chunk_size == 0 {
            return invalid("minimum chunk size must be >= 1".into());
        }
        if self.salt_len < 8 {
            return invalid(format!("salt length must be >= 8 (got {})", self.salt_len));
        }
        if !self.input_path.is_file() {
            return invalid(format!("input is not a file: {}", self.input_path.display()));
        }
        if same_file(&self.input_path, &self.output_path) {
            return invalid(format!(
                "output would overwrite input: {}",
                self.output_path.display()
            ));
        }
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Summary of a successful operation
#[derive(Debug, Clone, Serialize)]
pub struct SuccessInfo {
    pub output_path: PathBuf,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub chunks: usize,
    pub workers: usize,
    pub parallel: bool,
    pub elapsed: Duration,
}

/// Split `payload_len` bytes into tasks and attach each task's IV.
///
/// Only counter-style and block-independent modes are split, and only when
/// `parallel` is set and the payload clears the planner's threshold.
/// Everything else gets one task carrying the base IV.
pub fn build_tasks(
    algorithm: &AlgorithmSpec,
    mode: BlockMode,
    payload_len: u64,
    base_iv: Option<&[u8]>,
    parallel: bool,
    workers: usize,
    min_chunk_size: u64,
) -> Result<Vec<ChunkTask>, EngineError> {
    let split = parallel
        && is_parallelizable(algorithm.family, mode)
        && should_parallelize(payload_len, workers, min_chunk_size);

    if !split {
        let task = ChunkTask::whole(payload_len);
        return Ok(vec![match base_iv {
            Some(iv) => task.with_iv(iv.to_vec()),
            None => task,
        }]);
    }

    plan_chunks(payload_len, algorithm.block_size_bytes, workers, min_chunk_size)
        .into_iter()
        .map(|task| -> Result<ChunkTask, EngineError> {
            match base_iv {
                Some(iv) => {
                    let offset = task.start_offset;
                    Ok(task.with_iv(derive_chunk_iv(iv, algorithm.block_size_bytes, offset)?))
                }
                None => Ok(task),
            }
        })
        .collect()
}

fn check_ciphertext_len(spec: &AlgorithmSpec, mode: BlockMode, len: u64) -> Result<(), EngineError> {
    let block = spec.block_size_bytes as u64;
    if is_padded(mode) && (len == 0 || len % block != 0) {
        return Err(EngineError::Validation(format!(
            "ciphertext of {len} bytes is not a positive multiple of the {block}-byte block size"
        )));
    }
    if mode == BlockMode::Gcm && len < GCM_TAG_LEN as u64 {
        return Err(EngineError::Validation(format!(
            "ciphertext of {len} bytes is too short to hold the authentication tag"
        )));
    }
    Ok(())
}

fn check_gcm_limit(mode: BlockMode, plaintext_len: u64) -> Result<(), EngineError> {
    if mode == BlockMode::Gcm && plaintext_len > GCM_MAX_PAYLOAD {
        return Err(EngineError::Validation(format!(
            "GCM payload of {plaintext_len} bytes exceeds the {GCM_MAX_PAYLOAD}-byte limit; \
             use ctr for larger files"
        )));
    }
    Ok(())
}

fn read_input_header(config: &OperationConfig, iv_len: usize) -> Result<FileHeader, EngineError> {
    let path = &config.input_path;
    let mut file =
        File::open(path).map_err(|e| EngineError::io(format!("opening {}", path.display()), e))?;
    read_header(&mut file, config.salt_len, iv_len).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            EngineError::Validation(format!(
                "{} is too short to contain a {}-byte header",
                path.display(),
                config.salt_len + iv_len
            ))
        } else {
            EngineError::io(format!("reading header of {}", path.display()), e)
        }
    })
}

/// Encrypt or decrypt `config.input_path` into `config.output_path`.
///
/// The destination only appears once every chunk has succeeded; on failure
/// the partial output is removed and no file is left behind.
pub fn run_operation(
    config: &OperationConfig,
    on_progress: Option<ProgressFn>,
) -> Result<SuccessInfo, EngineError> {
    let started = Instant::now();
    config.validate()?;

    let spec = config.algorithm;
    let encrypt = config.direction.is_encrypt();
    let iv_len = iv_len(spec, config.mode);

    let header = if encrypt {
        FileHeader {
            salt: random_bytes(config.salt_len),
            iv: (iv_len > 0).then(|| random_bytes(iv_len)),
        }
    } else {
        read_input_header(config, iv_len)?
    };
    let payload_offset = if encrypt { 0 } else { header.len() as u64 };

    let source = FileSource::open(&config.input_path, payload_offset).map_err(|e| {
        EngineError::io(format!("opening {}", config.input_path.display()), e)
    })?;
    let payload_len = source.len();
    if encrypt {
        check_gcm_limit(config.mode, payload_len)?;
    } else {
        check_ciphertext_len(spec, config.mode, payload_len)?;
        check_gcm_limit(config.mode, payload_len.saturating_sub(GCM_TAG_LEN as u64))?;
    }

    let material = derive_key_material(&config.password, &header.salt, &config.kdf, spec)?;
    debug!(kdf = %config.kdf.algorithm, iterations = config.kdf.iterations, "derived key");
    let factory = KeyedCipherFactory::new(
        spec,
        config.mode,
        config.direction,
        material.key,
        material.stream_nonce,
    );

    let tasks = build_tasks(
        spec,
        config.mode,
        payload_len,
        header.iv.as_deref(),
        config.parallelism_enabled,
        config.worker_count,
        config.min_chunk_size,
    )?;
    let chunks = tasks.len();
    let parallel = chunks > 1;
    let workers = if parallel {
        config.worker_count.min(chunks)
    } else {
        1
    };
    info!(
        direction = %config.direction,
        algorithm = spec.id,
        mode = %config.mode,
        bytes = payload_len,
        chunks,
        workers,
        "starting operation"
    );

    let output_dir = config
        .output_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(output_dir).map_err(|e| {
        EngineError::io(format!("creating temp file in {}", output_dir.display()), e)
    })?;

    let write_err = |e: io::Error| {
        EngineError::io(format!("writing output for {}", config.output_path.display()), e)
    };
    let options = ExecuteOptions {
        workers,
        buffer_size: config.buffer_size,
        spill_to_disk: config.spill_to_disk,
    };
    let bytes_out = {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        let mut written = 0;
        if encrypt {
            write_header(&mut writer, &header).map_err(write_err)?;
            written += header.len() as u64;
        }
        let outputs = execute(tasks, &factory, &source, &options, on_progress)?;
        written += reassemble(&mut writer, outputs).map_err(write_err)?;
        writer.flush().map_err(write_err)?;
        written
    };
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(&config.output_path).map_err(|e| {
        EngineError::io(format!("persisting {}", config.output_path.display()), e.error)
    })?;

    let info = SuccessInfo {
        output_path: config.output_path.clone(),
        bytes_in: payload_offset + payload_len,
        bytes_out,
        chunks,
        workers,
        parallel,
        elapsed: started.elapsed(),
    };
    info!(
        output = %info.output_path.display(),
        bytes_in = info.bytes_in,
        bytes_out = info.bytes_out,
        elapsed_ms = info.elapsed.as_millis() as u64,
        "operation complete"
    );
    Ok(info)
}
