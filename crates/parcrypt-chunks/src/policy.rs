//! Worker-count policy

/// Absolute ceiling on worker threads regardless of core count
pub const HARD_MAX_WORKERS: usize = 32;

/// Upper bound for this host: 2× available cores, capped at `HARD_MAX_WORKERS`.
pub fn max_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores * 2).clamp(1, HARD_MAX_WORKERS)
}

/// Resolve a requested worker count (0 = available cores) into `[1, max_workers()]`.
pub fn effective_workers(requested: usize) -> usize {
    let limit = max_workers();
    let wanted = if requested == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        requested
    };
    if wanted > limit {
        tracing::debug!(requested = wanted, limit, "clamping worker count");
    }
    wanted.clamp(1, limit)
}
