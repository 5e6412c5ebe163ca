//! Benchmark output parser
//!
//! Workers print independently, so lines from different ranks interleave in
//! any order. The parser therefore scans the whole output, collects every
//! line it recognizes and only then reconciles what it found against the
//! expected rank set.
//!
//! ## Line grammar
//!
//! ```text
//! MPI run time for rank <r>: <seconds> seconds     one per rank (parallel)
//! Summation from 1 to <n> is: <total>              exactly once (parallel)
//! Total Sum from 1 to <n>: <total>                 exactly once (serial)
//! Serial Run Time (seconds): <seconds>             exactly once (serial)
//! ```
//!
//! Matching is case-insensitive and ignores surrounding whitespace. Lines of
//! any other shape (launcher banners, warnings) are skipped.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::runner::RawOutput;

/// Defect found in benchmark output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No timing line for an expected rank
    #[error("missing timing line for rank {rank}")]
    MissingRank {
        /// Rank without a timing line
        rank: u32,
    },
    /// More than one timing line for a rank
    #[error("duplicate timing line for rank {rank}")]
    DuplicateRank {
        /// Rank reported twice
        rank: u32,
    },
    /// Timing line for a rank outside `0..workers`
    #[error("timing line for rank {rank} but only {workers} worker(s) were launched")]
    UnexpectedRank {
        /// Reported rank
        rank: u32,
        /// Launched worker count
        workers: u32,
    },
    /// A field that should be a number is not one
    #[error("unparsable {field} `{value}` in line `{line}`")]
    InvalidNumber {
        /// Which field
        field: &'static str,
        /// Offending token
        value: String,
        /// Full line
        line: String,
    },
    /// No aggregate-result line
    #[error("missing aggregate result line")]
    MissingAggregate,
    /// More than one aggregate-result line
    #[error("duplicate aggregate result line")]
    DuplicateAggregate,
    /// No serial timing line in a single-worker run
    #[error("missing serial run time line")]
    MissingSerialTime,
    /// More than one serial timing line
    #[error("duplicate serial run time line")]
    DuplicateSerialTime,
    /// A recognized line that does not belong to this kind of run
    #[error("unexpected {kind} line for a {workers}-worker run: `{line}`")]
    UnexpectedLine {
        /// Kind of line found
        kind: &'static str,
        /// Launched worker count
        workers: u32,
        /// Full line
        line: String,
    },
    /// Aggregate line reports a different problem size than requested
    #[error("output reports input size {reported}, expected {expected}")]
    InputSizeMismatch {
        /// Requested input size
        expected: u64,
        /// Input size printed by the benchmark
        reported: u64,
    },
}

impl ParseError {
    /// Whether the defect looks like truncated output (worth a retry).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingRank { .. } | Self::MissingAggregate | Self::MissingSerialTime
        )
    }
}

/// Timing and result data of one successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunObservation {
    core_count: u32,
    per_worker_times: Vec<(u32, f64)>,
    input_size: u64,
    aggregate_result: i64,
    exit_code: Option<i32>,
}

impl RunObservation {
    /// Worker count of the run.
    #[must_use]
    pub const fn core_count(&self) -> u32 {
        self.core_count
    }

    /// `(rank, seconds)` pairs ordered by rank.
    #[must_use]
    pub fn per_worker_times(&self) -> &[(u32, f64)] {
        &self.per_worker_times
    }

    /// Problem size the benchmark reported.
    #[must_use]
    pub const fn input_size(&self) -> u64 {
        self.input_size
    }

    /// Final summed value.
    #[must_use]
    pub const fn aggregate_result(&self) -> i64 {
        self.aggregate_result
    }

    /// Exit code of the run.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Wall time of the run: the slowest worker's time.
    #[must_use]
    pub fn parallel_time(&self) -> f64 {
        self.per_worker_times
            .iter()
            .map(|&(_, t)| t)
            .fold(0.0, f64::max)
    }
}

/// Line grammar compiled once and reused across runs.
#[derive(Debug, Clone)]
pub struct OutputParser {
    rank_time: Regex,
    aggregate: Regex,
    serial_result: Regex,
    serial_time: Regex,
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Scan {
    ranks: BTreeMap<u32, f64>,
    aggregate: Option<(u64, i64)>,
    serial_result: Option<(u64, i64)>,
    serial_time: Option<f64>,
}

impl OutputParser {
    /// Compile the line grammar.
    ///
    /// # Panics
    ///
    /// Never in practice: the patterns are constant and covered by tests.
    #[must_use]
    pub fn new() -> Self {
        let compile = |pattern: &str| Regex::new(pattern).expect("constant pattern compiles");
        Self {
            rank_time: compile(r"(?i)^mpi run time for rank\s+(\d+)\s*:\s*(\S+)\s+seconds$"),
            aggregate: compile(r"(?i)^summation from 1 to\s+(\S+)\s+is\s*:\s*(\S+)$"),
            serial_result: compile(r"(?i)^total sum from 1 to\s+(\S+)\s*:\s*(\S+)$"),
            serial_time: compile(r"(?i)^serial run time \(seconds\)\s*:\s*(\S+)$"),
        }
    }

    /// Parse a captured run into an observation.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] naming the first defect found.
    pub fn parse(&self, raw: &RawOutput, workers: u32) -> Result<RunObservation, ParseError> {
        let mut observation = self.parse_text(&raw.stdout, workers)?;
        observation.exit_code = raw.exit_code;
        Ok(observation)
    }

    /// Parse benchmark stdout for a run with `workers` workers.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] naming the first defect found.
    pub fn parse_text(&self, text: &str, workers: u32) -> Result<RunObservation, ParseError> {
        let scan = self.scan(text, workers)?;
        debug!(
            workers,
            ranks = scan.ranks.len(),
            "scanned benchmark output"
        );

        let (per_worker_times, (input_size, aggregate_result)) = if workers <= 1 {
            let result = scan.serial_result.ok_or(ParseError::MissingAggregate)?;
            let time = scan.serial_time.ok_or(ParseError::MissingSerialTime)?;
            (vec![(0, time)], result)
        } else {
            if let Some(rank) = (0..workers).find(|r| !scan.ranks.contains_key(r)) {
                return Err(ParseError::MissingRank { rank });
            }
            let result = scan.aggregate.ok_or(ParseError::MissingAggregate)?;
            (scan.ranks.into_iter().collect(), result)
        };

        Ok(RunObservation {
            core_count: workers.max(1),
            per_worker_times,
            input_size,
            aggregate_result,
            exit_code: Some(0),
        })
    }

    fn scan(&self, text: &str, workers: u32) -> Result<Scan, ParseError> {
        let serial = workers <= 1;
        let mut scan = Scan::default();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(caps) = self.rank_time.captures(line) {
                if serial {
                    return Err(unexpected("rank timing", workers, line));
                }
                let rank: u32 = parse_field(&caps[1], "rank", line)?;
                let seconds = parse_seconds(&caps[2], line)?;
                if rank >= workers {
                    return Err(ParseError::UnexpectedRank { rank, workers });
                }
                if scan.ranks.insert(rank, seconds).is_some() {
                    return Err(ParseError::DuplicateRank { rank });
                }
            } else if let Some(caps) = self.aggregate.captures(line) {
                if serial {
                    return Err(unexpected("aggregate result", workers, line));
                }
                let result = parse_result_pair(&caps[1], &caps[2], line)?;
                if scan.aggregate.replace(result).is_some() {
                    return Err(ParseError::DuplicateAggregate);
                }
            } else if let Some(caps) = self.serial_result.captures(line) {
                if !serial {
                    return Err(unexpected("serial result", workers, line));
                }
                let result = parse_result_pair(&caps[1], &caps[2], line)?;
                if scan.serial_result.replace(result).is_some() {
                    return Err(ParseError::DuplicateAggregate);
                }
            } else if let Some(caps) = self.serial_time.captures(line) {
                if !serial {
                    return Err(unexpected("serial timing", workers, line));
                }
                let seconds = parse_seconds(&caps[1], line)?;
                if scan.serial_time.replace(seconds).is_some() {
                    return Err(ParseError::DuplicateSerialTime);
                }
            }
        }
        Ok(scan)
    }
}

fn unexpected(kind: &'static str, workers: u32, line: &str) -> ParseError {
    ParseError::UnexpectedLine {
        kind,
        workers,
        line: line.to_string(),
    }
}

fn parse_field<T: std::str::FromStr>(
    token: &str,
    field: &'static str,
    line: &str,
) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: token.to_string(),
        line: line.to_string(),
    })
}

fn parse_seconds(token: &str, line: &str) -> Result<f64, ParseError> {
    let seconds: f64 = parse_field(token, "seconds", line)?;
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err(ParseError::InvalidNumber {
            field: "seconds",
            value: token.to_string(),
            line: line.to_string(),
        })
    }
}

fn parse_result_pair(size: &str, total: &str, line: &str) -> Result<(u64, i64), ParseError> {
    Ok((
        parse_field(size, "input size", line)?,
        parse_field(total, "aggregate result", line)?,
    ))
}
