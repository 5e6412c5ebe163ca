//! Sweep configuration
//!
//! Loaded from a JSON file or assembled with [`SweepConfig::builder`].
//!
//! ```json
//! {
//!   "binary": "./summation",
//!   "input_size": 10000000,
//!   "worker_counts": [1, 2, 4, 8],
//!   "timeout_secs": 300,
//!   "retry_limit": 2,
//!   "launcher": { "kind": "mpirun", "program": "mpirun", "extra_args": ["--use-hwthread-cpus"] }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::runner::Launcher;
use crate::{Error, Result};

/// Default problem size handed to the benchmark.
pub const DEFAULT_INPUT_SIZE: u64 = 10_000_000;

/// Default per-run timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default number of retries for transient failures.
pub const DEFAULT_RETRY_LIMIT: u32 = 2;

const fn default_input_size() -> u64 {
    DEFAULT_INPUT_SIZE
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

const fn default_repetitions() -> u32 {
    1
}

/// Number of CPU cores available to this process (1 if undetectable).
#[must_use]
pub fn available_cores() -> u32 {
    std::thread::available_parallelism()
        .ok()
        .and_then(|n| u32::try_from(n.get()).ok())
        .unwrap_or(1)
}

/// `1, 2, 4, …` up to `max`, with `max` itself appended when it is not a
/// power of two.
#[must_use]
pub fn default_worker_counts(max: u32) -> Vec<u32> {
    let max = max.max(1);
    let mut counts: Vec<u32> = std::iter::successors(Some(1u32), |&c| c.checked_mul(2))
        .take_while(|&c| c <= max)
        .collect();
    if counts.last() != Some(&max) {
        counts.push(max);
    }
    counts
}

fn default_counts() -> Vec<u32> {
    default_worker_counts(available_cores())
}

/// Everything a sweep needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Benchmark executable
    pub binary: PathBuf,
    /// Problem size passed as the benchmark's only argument
    #[serde(default = "default_input_size")]
    pub input_size: u64,
    /// Worker counts, ascending, starting at 1
    #[serde(default = "default_counts")]
    pub worker_counts: Vec<u32>,
    /// Per-run timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts granted to a configuration after a transient failure
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    /// Successful runs per configuration (median time is kept)
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    /// How multi-worker runs are launched
    #[serde(default)]
    pub launcher: Launcher,
    /// Serial fraction used for predicted speedups; inferred when absent
    #[serde(default)]
    pub serial_fraction: Option<f64>,
}

impl SweepConfig {
    /// Start building a configuration for `binary`.
    #[must_use]
    pub fn builder(binary: impl Into<PathBuf>) -> SweepConfigBuilder {
        SweepConfigBuilder::new(binary)
    }

    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON or fails
    /// [`validate`](Self::validate).
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Per-run timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check the invariants the sweep relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if self.worker_counts.first() != Some(&1) {
            return invalid(format!(
                "worker counts must start with the baseline 1, got {:?}",
                self.worker_counts
            ));
        }
        if let Some(w) = self.worker_counts.windows(2).find(|w| w[0] >= w[1]) {
            return invalid(format!(
                "worker counts must be strictly ascending ({} then {})",
                w[0], w[1]
            ));
        }
        if self.input_size == 0 {
            return invalid("input size must be positive".to_string());
        }
        if self.timeout_secs == 0 {
            return invalid("timeout must be at least one second".to_string());
        }
        if self.repetitions == 0 {
            return invalid("repetitions must be at least 1".to_string());
        }
        if let Some(f) = self.serial_fraction {
            if !(0.0..=1.0).contains(&f) {
                return invalid(format!("serial fraction {f} outside [0, 1]"));
            }
        }
        Ok(())
    }
}

/// Builder for `SweepConfig`.
#[derive(Debug)]
pub struct SweepConfigBuilder {
    config: SweepConfig,
}

impl SweepConfigBuilder {
    /// Create a builder with defaults for everything but the binary.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            config: SweepConfig {
                binary: binary.into(),
                input_size: DEFAULT_INPUT_SIZE,
                worker_counts: default_counts(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                retry_limit: DEFAULT_RETRY_LIMIT,
                repetitions: 1,
                launcher: Launcher::default(),
                serial_fraction: None,
            },
        }
    }

    /// Set the problem size.
    #[must_use]
    pub const fn input_size(mut self, input_size: u64) -> Self {
        self.config.input_size = input_size;
        self
    }

    /// Set the worker counts to sweep.
    #[must_use]
    pub fn worker_counts(mut self, counts: impl Into<Vec<u32>>) -> Self {
        self.config.worker_counts = counts.into();
        self
    }

    /// Set the per-run timeout in seconds.
    #[must_use]
    pub const fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    /// Set the retry limit for transient failures.
    #[must_use]
    pub const fn retry_limit(mut self, retries: u32) -> Self {
        self.config.retry_limit = retries;
        self
    }

    /// Set the number of repetitions per configuration.
    #[must_use]
    pub const fn repetitions(mut self, repetitions: u32) -> Self {
        self.config.repetitions = repetitions;
        self
    }

    /// Set the launcher for multi-worker runs.
    #[must_use]
    pub fn launcher(mut self, launcher: Launcher) -> Self {
        self.config.launcher = launcher;
        self
    }

    /// Fix the serial fraction used for predicted speedups.
    #[must_use]
    pub const fn serial_fraction(mut self, f: f64) -> Self {
        self.config.serial_fraction = Some(f);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if validation fails.
    pub fn build(self) -> Result<SweepConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_worker_counts() {
        assert_eq!(default_worker_counts(1), vec![1]);
        assert_eq!(default_worker_counts(8), vec![1, 2, 4, 8]);
        assert_eq!(default_worker_counts(6), vec![1, 2, 4, 6]);
        assert_eq!(default_worker_counts(0), vec![1]);
    }

    #[test]
    fn test_builder_defaults_validate() {
        let config = SweepConfig::builder("./summation").build().unwrap();
        assert_eq!(config.input_size, DEFAULT_INPUT_SIZE);
        assert_eq!(config.worker_counts.first(), Some(&1));
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_rejects_missing_baseline() {
        let err = SweepConfig::builder("b")
            .worker_counts(vec![2, 4])
            .build()
            .unwrap_err();
        assert!(format!("{err}").contains("baseline"));
    }

    #[test]
    fn test_rejects_unordered_counts() {
        assert!(SweepConfig::builder("b")
            .worker_counts(vec![1, 4, 2])
            .build()
            .is_err());
        assert!(SweepConfig::builder("b")
            .worker_counts(vec![1, 2, 2])
            .build()
            .is_err());
    }

    #[test]
    fn test_rejects_bad_scalars() {
        assert!(SweepConfig::builder("b").input_size(0).build().is_err());
        assert!(SweepConfig::builder("b").timeout_secs(0).build().is_err());
        assert!(SweepConfig::builder("b").repetitions(0).build().is_err());
        assert!(SweepConfig::builder("b").serial_fraction(1.5).build().is_err());
    }

    #[test]
    fn test_json_defaults() {
        let config: SweepConfig =
            serde_json::from_str(r#"{"binary":"./summation","worker_counts":[1,2]}"#).unwrap();
        assert_eq!(config.input_size, DEFAULT_INPUT_SIZE);
        assert_eq!(config.retry_limit, DEFAULT_RETRY_LIMIT);
        assert_eq!(config.repetitions, 1);
        assert_eq!(config.launcher, Launcher::default());
        assert!(config.serial_fraction.is_none());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        std::fs::write(
            &path,
            r#"{"binary":"./summation","input_size":1000,"worker_counts":[1,2,4],
                "launcher":{"kind":"direct","workers_env":"SWEEP_WORKERS"}}"#,
        )
        .unwrap();
        let config = SweepConfig::from_json_file(&path).unwrap();
        assert_eq!(config.input_size, 1000);
        assert_eq!(config.worker_counts, vec![1, 2, 4]);

        std::fs::write(&path, r#"{"binary":"b","worker_counts":[3]}"#).unwrap();
        assert!(matches!(
            SweepConfig::from_json_file(&path),
            Err(Error::InvalidConfig(_))
        ));
    }
}
