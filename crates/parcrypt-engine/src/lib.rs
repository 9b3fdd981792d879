//! parcrypt-engine: chunked parallel encryption and decryption of files
//!
//! - `operation`: validated config → header → plan → execute → persist
//! - `orchestrator`: bounded rayon pool, one task per chunk, first error wins
//! - `framing`: `[salt][iv?]` header and ordered reassembly of chunk outputs
//! - `progress`: shared atomics and monotonic progress delivery
//! - `source`: positioned readers over the payload

pub mod error;
pub mod framing;
pub mod operation;
pub mod orchestrator;
pub mod progress;
pub mod source;

pub use error::{ChunkFailure, ChunkFailureKind, EngineError};
pub use framing::{read_header, reassemble, write_header, FileHeader};
pub use operation::{build_tasks, run_operation, OperationConfig, SuccessInfo, GCM_MAX_PAYLOAD};
pub use orchestrator::{execute, ChunkOutput, ExecuteOptions, MEMORY_CHUNK_LIMIT};
pub use progress::{OperationState, ProgressFn, ProgressReporter, ProgressSnapshot};
pub use source::{ChunkSource, FileSource, MemorySource};
