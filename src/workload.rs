//! Reference workload: the sum `1 + 2 + … + n` split across workers.
//!
//! Used by the bundled `summation` binary, which speaks the benchmark
//! output grammar and lets a sweep run end to end without an MPI install.
//! The worker's identity is an explicit [`WorkerContext`] handed to every
//! function that needs it.

use std::ops::RangeInclusive;

use thiserror::Error;

/// Environment variable carrying the worker count for `Launcher::Direct`.
pub const WORKERS_ENV: &str = "SWEEP_WORKERS";

/// Largest `n` whose triangular number fits in an `i64`.
pub const MAX_INPUT_SIZE: u64 = 3_000_000_000;

/// Invalid workload parameters.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadError {
    /// `n` must be at least 1
    #[error("input size must be positive")]
    ZeroInput,
    /// `n` too large for the result type
    #[error("input size {0} exceeds {MAX_INPUT_SIZE}")]
    InputTooLarge(u64),
    /// At least one worker is required
    #[error("worker count must be positive")]
    ZeroWorkers,
    /// Rank not in `0..size`
    #[error("rank {rank} out of range for {size} worker(s)")]
    RankOutOfRange {
        /// Offending rank
        rank: u32,
        /// Worker count
        size: u32,
    },
}

/// Identity of one worker within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerContext {
    rank: u32,
    size: u32,
}

impl WorkerContext {
    /// Context for worker `rank` of `size`.
    ///
    /// # Errors
    ///
    /// Returns error if `size == 0` or `rank >= size`.
    pub const fn new(rank: u32, size: u32) -> Result<Self, WorkloadError> {
        if size == 0 {
            return Err(WorkloadError::ZeroWorkers);
        }
        if rank >= size {
            return Err(WorkloadError::RankOutOfRange { rank, size });
        }
        Ok(Self { rank, size })
    }

    /// This worker's rank.
    #[must_use]
    pub const fn rank(self) -> u32 {
        self.rank
    }

    /// Total number of workers.
    #[must_use]
    pub const fn size(self) -> u32 {
        self.size
    }

    /// Whether this worker reports the aggregate.
    #[must_use]
    pub const fn is_root(self) -> bool {
        self.rank == 0
    }
}

/// Check `n` before any work is split.
///
/// # Errors
///
/// Returns error if `n` is zero or too large.
pub const fn validate_input(n: u64) -> Result<u64, WorkloadError> {
    if n == 0 {
        Err(WorkloadError::ZeroInput)
    } else if n > MAX_INPUT_SIZE {
        Err(WorkloadError::InputTooLarge(n))
    } else {
        Ok(n)
    }
}

/// Terms of `1..=n` owned by `ctx`; the last rank absorbs the remainder.
#[must_use]
pub fn partition(ctx: WorkerContext, n: u64) -> RangeInclusive<u64> {
    let chunk = n / u64::from(ctx.size);
    let rank = u64::from(ctx.rank);
    let start = rank * chunk + 1;
    let end = if ctx.rank + 1 == ctx.size {
        n
    } else {
        (rank + 1) * chunk
    };
    start..=end
}

/// Sum of this worker's share of `1..=n`.
///
/// `n` must have passed [`validate_input`].
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn local_sum(ctx: WorkerContext, n: u64) -> i64 {
    // Bounded by MAX_INPUT_SIZE, so the sum fits.
    partition(ctx, n).sum::<u64>() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(rank: u32, size: u32) -> WorkerContext {
        WorkerContext::new(rank, size).unwrap()
    }

    #[test]
    fn test_context_validation() {
        assert_eq!(WorkerContext::new(0, 0), Err(WorkloadError::ZeroWorkers));
        assert_eq!(
            WorkerContext::new(3, 3),
            Err(WorkloadError::RankOutOfRange { rank: 3, size: 3 })
        );
        assert!(ctx(0, 3).is_root());
        assert!(!ctx(2, 3).is_root());
    }

    #[test]
    fn test_serial_sum() {
        assert_eq!(local_sum(ctx(0, 1), 1000), 500_500);
    }

    #[test]
    fn test_partitions_cover_input_with_remainder() {
        let n = 10;
        let parts: Vec<_> = (0..3).map(|r| partition(ctx(r, 3), n)).collect();
        assert_eq!(parts, vec![1..=3, 4..=6, 7..=10]);
        let total: i64 = (0..3).map(|r| local_sum(ctx(r, 3), n)).sum();
        assert_eq!(total, 55);
    }

    #[test]
    fn test_more_workers_than_terms() {
        let total: i64 = (0..8).map(|r| local_sum(ctx(r, 8), 3)).sum();
        assert_eq!(total, 6);
        assert!(partition(ctx(0, 8), 3).is_empty());
    }

    #[test]
    fn test_validate_input() {
        assert_eq!(validate_input(0), Err(WorkloadError::ZeroInput));
        assert!(validate_input(MAX_INPUT_SIZE + 1).is_err());
        assert_eq!(validate_input(1000), Ok(1000));
    }
}
