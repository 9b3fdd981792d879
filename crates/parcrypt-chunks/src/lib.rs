//! parcrypt-chunks: splitting a payload into block-aligned chunks
//!
//! # Overview
//! - `planner`: contiguous, block-aligned chunk ranges for the worker pool
//! - `policy`: clamping a requested worker count to what the host can use

pub mod planner;
pub mod policy;

pub use planner::{plan_chunks, should_parallelize, ChunkTask};
pub use policy::{effective_workers, max_workers, HARD_MAX_WORKERS};
