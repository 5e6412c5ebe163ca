//! Error types for amdahl-sweep
//!
//! Runner and parser failures propagate up to the sweep, which decides
//! between retry, degrade (a `Missing` record) and abort (baseline only).

use std::time::Duration;

use thiserror::Error;

use crate::metrics::MetricError;
use crate::parser::ParseError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// amdahl-sweep error types
#[derive(Error, Debug)]
pub enum Error {
    /// The benchmark (or its launcher) could not be started
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The benchmark exited with a non-zero status
    #[error("benchmark failed with {workers} worker(s): exit code {code:?}")]
    RunFailure {
        /// Worker count of the failed run
        workers: u32,
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// The benchmark exceeded its time budget and its process group was killed
    #[error("benchmark with {workers} worker(s) timed out after {timeout:?}")]
    Timeout {
        /// Worker count of the timed-out run
        workers: u32,
        /// Configured timeout
        timeout: Duration,
    },

    /// Benchmark output did not match the line grammar
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Aggregate result disagrees with the reference run of the same input
    #[error("inconsistent result with {workers} worker(s): expected {expected}, got {actual}")]
    InconsistentResult {
        /// Worker count of the disagreeing run
        workers: u32,
        /// Reference aggregate (baseline or first repetition)
        expected: i64,
        /// Aggregate reported by this run
        actual: i64,
    },

    /// Degenerate numeric input to a metric
    #[error("metric error: {0}")]
    Metric(#[from] MetricError),

    /// The baseline (single worker) configuration failed; the sweep is aborted
    #[error("baseline run failed, sweep aborted: {0}")]
    FatalBaseline(#[source] Box<Error>),

    /// Sweep configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Dataset append would break strictly increasing core-count order
    #[error("record for {core_count} worker(s) out of order (last: {last})")]
    OutOfOrder {
        /// Core count of the rejected record
        core_count: u32,
        /// Core count of the last accepted record
        last: u32,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (config or export) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same configuration may succeed.
    ///
    /// Timeouts and truncated output are transient; a non-zero exit, a
    /// malformed line or a disagreeing result is not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Parse(err) => err.is_recoverable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = Error::Timeout {
            workers: 4,
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_transient());
        assert!(Error::Parse(ParseError::MissingAggregate).is_transient());
        assert!(!Error::Parse(ParseError::DuplicateRank { rank: 1 }).is_transient());

        let failure = Error::RunFailure {
            workers: 2,
            code: Some(1),
            stderr: String::new(),
        };
        assert!(!failure.is_transient());
    }

    #[test]
    fn test_fatal_baseline_keeps_cause() {
        let err = Error::FatalBaseline(Box::new(Error::Parse(ParseError::MissingSerialTime)));
        let msg = format!("{err}");
        assert!(msg.contains("baseline run failed"));
        assert!(msg.contains("serial"));
    }
}
