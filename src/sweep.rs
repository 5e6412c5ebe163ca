//! Sweep driver
//!
//! Runs the configured worker counts one at a time, in ascending order,
//! and turns each run into a [`MetricsRecord`] relative to the baseline.
//!
//! ## Failure policy
//!
//! - Baseline (1 worker): retried like any configuration on transient
//!   failures; if it still fails the sweep aborts with
//!   [`Error::FatalBaseline`] and nothing else is run.
//! - Any other configuration: transient failures are retried up to
//!   `retry_limit` times, after which (or on any other failure) the
//!   configuration becomes a `Missing` record and the sweep moves on.
//!
//! Configurations never overlap, so one run's workers cannot contend with
//! another's. Cancellation is checked between configurations only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::SweepConfig;
use crate::dataset::{Dataset, MetricsRecord, RecordStatus};
use crate::metrics::{self, MetricError};
use crate::parser::{OutputParser, ParseError, RunObservation};
use crate::runner::BenchmarkRunner;
use crate::{Error, Result};

/// Cooperative cancellation flag, shared with whoever may want to stop the sweep.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect before the next configuration.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a sweep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepStatus {
    /// Every configured worker count was attempted.
    Completed,
    /// Stopped early by a cancel request; the dataset is partial.
    Cancelled,
}

/// Outcome of a sweep that got past its baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    dataset: Dataset,
    status: SweepStatus,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    model_serial_fraction: Option<f64>,
}

impl SweepReport {
    /// The assembled dataset.
    #[must_use]
    pub const fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Take ownership of the dataset.
    #[must_use]
    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }

    /// Whether the sweep completed or was cancelled.
    #[must_use]
    pub const fn status(&self) -> SweepStatus {
        self.status
    }

    /// When the sweep started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the sweep ended.
    #[must_use]
    pub const fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    /// Serial fraction behind `predicted_speedup`, configured or inferred.
    #[must_use]
    pub const fn model_serial_fraction(&self) -> Option<f64> {
        self.model_serial_fraction
    }
}

/// Drives a benchmark across the configured worker counts.
#[derive(Debug)]
pub struct Sweep<R> {
    runner: R,
    config: SweepConfig,
    parser: OutputParser,
    cancel: CancelToken,
}

impl<R: BenchmarkRunner> Sweep<R> {
    /// Create a sweep.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is invalid.
    pub fn new(runner: R, config: SweepConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            runner,
            config,
            parser: OutputParser::new(),
            cancel: CancelToken::new(),
        })
    }

    /// Use an externally owned cancel token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this sweep.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The sweep configuration.
    #[must_use]
    pub const fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run the whole sweep.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FatalBaseline`] if the single-worker configuration
    /// cannot be measured. Failures of other configurations never abort the
    /// sweep; they show up as `Missing` records.
    pub async fn run(&self) -> Result<SweepReport> {
        let started_at = Utc::now();
        let mut dataset = Dataset::new();
        info!(
            binary = %self.config.binary.display(),
            input_size = self.config.input_size,
            worker_counts = ?self.config.worker_counts,
            "starting sweep"
        );

        if self.cancel.is_cancelled() {
            warn!("sweep cancelled before the baseline");
            return Ok(self.finish(dataset, SweepStatus::Cancelled, started_at));
        }

        let (t1, reference) = self.run_baseline(&mut dataset).await?;

        let mut status = SweepStatus::Completed;
        for &workers in self.config.worker_counts.iter().skip(1) {
            if self.cancel.is_cancelled() {
                warn!(next = workers, "sweep cancelled");
                status = SweepStatus::Cancelled;
                break;
            }
            let record = self.run_configuration(workers, t1, reference).await;
            dataset.push(record)?;
        }

        Ok(self.finish(dataset, status, started_at))
    }

    async fn run_baseline(&self, dataset: &mut Dataset) -> Result<(f64, i64)> {
        info!(workers = 1, "running baseline");
        let (result, attempts) = self.measure(1).await;
        let fatal = |err: Error| {
            error!(attempts, error = %err, "baseline failed, aborting sweep");
            Error::FatalBaseline(Box::new(err))
        };

        let observation = result.map_err(fatal)?;
        let t1 = observation.parallel_time();
        if t1 <= 0.0 {
            return Err(fatal(MetricError::DivisionByZero.into()));
        }

        info!(t1, result = observation.aggregate_result(), "baseline recorded");
        dataset.push(MetricsRecord::baseline(t1, attempts))?;
        Ok((t1, observation.aggregate_result()))
    }

    async fn run_configuration(&self, workers: u32, t1: f64, reference: i64) -> MetricsRecord {
        info!(workers, "running configuration");
        let (result, attempts) = self.measure(workers).await;
        let record = result.and_then(|observation| {
            check_consistency(&observation, reference)?;
            derive_record(t1, &observation, attempts)
        });

        match record {
            Ok(record) => {
                if record.status == RecordStatus::Anomalous {
                    warn!(workers, serial_fraction = ?record.serial_fraction, "anomalous scaling");
                }
                record
            }
            Err(err) => {
                warn!(workers, attempts, error = %err, "configuration missing from dataset");
                MetricsRecord::missing(workers, attempts, err.to_string())
            }
        }
    }

    /// `repetitions` successful observations that agree on the aggregate;
    /// the one with the median parallel time is kept.
    async fn measure(&self, workers: u32) -> (Result<RunObservation>, u32) {
        let repetitions = self.config.repetitions.max(1) as usize;
        let mut observations: Vec<RunObservation> = Vec::with_capacity(repetitions);
        let mut total_attempts = 0;

        for _ in 0..repetitions {
            let (result, attempts) = self.observe_with_retry(workers).await;
            total_attempts += attempts;
            let observation = match result {
                Ok(observation) => observation,
                Err(err) => return (Err(err), total_attempts),
            };
            if let Some(first) = observations.first() {
                if first.aggregate_result() != observation.aggregate_result() {
                    let err = Error::InconsistentResult {
                        workers,
                        expected: first.aggregate_result(),
                        actual: observation.aggregate_result(),
                    };
                    return (Err(err), total_attempts);
                }
            }
            observations.push(observation);
        }

        observations.sort_by(|a, b| a.parallel_time().total_cmp(&b.parallel_time()));
        let median = observations.swap_remove(observations.len() / 2);
        (Ok(median), total_attempts)
    }

    async fn observe_with_retry(&self, workers: u32) -> (Result<RunObservation>, u32) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.observe(workers).await {
                Ok(observation) => return (Ok(observation), attempts),
                Err(err) => {
                    if let Error::RunFailure { stderr, .. } = &err {
                        debug!(workers, %stderr, "benchmark stderr");
                    }
                    if err.is_transient() && attempts <= self.config.retry_limit {
                        warn!(workers, attempts, error = %err, "transient failure, retrying");
                        continue;
                    }
                    return (Err(err), attempts);
                }
            }
        }
    }

    async fn observe(&self, workers: u32) -> Result<RunObservation> {
        let raw = self
            .runner
            .run(
                &self.config.binary,
                self.config.input_size,
                workers,
                self.config.timeout(),
            )
            .await?;
        debug!(workers, wall_time = ?raw.wall_time, "benchmark finished");

        let observation = self.parser.parse(&raw, workers)?;
        if observation.input_size() != self.config.input_size {
            return Err(ParseError::InputSizeMismatch {
                expected: self.config.input_size,
                reported: observation.input_size(),
            }
            .into());
        }
        Ok(observation)
    }

    fn finish(
        &self,
        mut dataset: Dataset,
        status: SweepStatus,
        started_at: DateTime<Utc>,
    ) -> SweepReport {
        let model_serial_fraction = self
            .config
            .serial_fraction
            .or_else(|| mean_serial_fraction(&dataset));
        if let Some(f) = model_serial_fraction {
            dataset.apply_prediction(f);
        }
        info!(
            records = dataset.len(),
            missing = dataset.with_status(RecordStatus::Missing).count(),
            ?status,
            ?model_serial_fraction,
            "sweep finished"
        );
        SweepReport {
            dataset,
            status,
            started_at,
            ended_at: Utc::now(),
            model_serial_fraction,
        }
    }
}

fn check_consistency(observation: &RunObservation, reference: i64) -> Result<()> {
    if observation.aggregate_result() == reference {
        Ok(())
    } else {
        Err(Error::InconsistentResult {
            workers: observation.core_count(),
            expected: reference,
            actual: observation.aggregate_result(),
        })
    }
}

/// Metrics of one multi-worker observation relative to baseline time `t1`.
fn derive_record(t1: f64, observation: &RunObservation, attempts: u32) -> Result<MetricsRecord> {
    let p = observation.core_count();
    let tp = observation.parallel_time();

    let speedup = metrics::speedup(t1, tp)?;
    let efficiency = metrics::efficiency(speedup, p)?;
    let parallel = metrics::parallel_fraction(t1, tp, p)?;
    let serial = metrics::empirical_serial_fraction(t1, tp, p)?;

    let (status, note) = if serial.is_anomalous() {
        (
            RecordStatus::Anomalous,
            Some(format!(
                "serial fraction {:.4} outside [0, 1]",
                serial.value()
            )),
        )
    } else {
        (RecordStatus::Ok, None)
    };

    Ok(MetricsRecord {
        core_count: p,
        time: Some(tp),
        speedup: Some(speedup),
        efficiency: Some(efficiency),
        predicted_speedup: None,
        parallel_fraction: Some(parallel.value()),
        serial_fraction: Some(serial.value()),
        status,
        attempts,
        note,
    })
}

/// Mean serial fraction of the in-range multi-worker records.
#[allow(clippy::cast_precision_loss)]
fn mean_serial_fraction(dataset: &Dataset) -> Option<f64> {
    let fractions: Vec<f64> = dataset
        .with_status(RecordStatus::Ok)
        .filter_map(|r| r.serial_fraction)
        .collect();
    if fractions.is_empty() {
        None
    } else {
        Some(fractions.iter().sum::<f64>() / fractions.len() as f64)
    }
}
