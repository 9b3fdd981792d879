use std::io;

use parcrypt_crypto::{CipherError, KdfError};
use thiserror::Error;

/// Errors returned by [`run_operation`](crate::run_operation) and the orchestrator
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any worker started
    #[error("invalid operation: {0}")]
    Validation(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Kdf(#[from] KdfError),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// First chunk failure observed by the worker pool
    #[error("operation failed after {completed_chunks} completed chunk(s): {source}")]
    Aggregate {
        #[source]
        source: Box<ChunkFailure>,
        completed_chunks: u32,
    },
}

impl EngineError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        EngineError::Io {
            context: context.into(),
            source,
        }
    }

    /// The chunk failure behind an `Aggregate` error, if any
    pub fn chunk_failure(&self) -> Option<&ChunkFailure> {
        match self {
            EngineError::Aggregate { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// A failure inside one worker task
#[derive(Debug, Error)]
#[error("chunk {index}: {kind}")]
pub struct ChunkFailure {
    pub index: u32,
    #[source]
    pub kind: ChunkFailureKind,
}

#[derive(Debug, Error)]
pub enum ChunkFailureKind {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}
