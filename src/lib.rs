//! # amdahl-sweep: Parallel Scaling Sweeps
//!
//! Runs a benchmark at increasing worker counts, parses its timing output
//! and derives speedup, efficiency, Amdahl-predicted speedup and the
//! empirical serial fraction for every configuration.
//!
//! ## Pipeline
//!
//! ```text
//! runner ──> parser ──> metrics ──> sweep ──> dataset
//! (spawn)    (lines)    (pure)      (order,    (Arrow / Parquet /
//!                                    retry)     JSON / table)
//! ```
//!
//! Each stage is independently testable and connected to the next by a
//! typed record ([`runner::RawOutput`], [`parser::RunObservation`],
//! [`dataset::MetricsRecord`]).
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use amdahl_sweep::runner::{Launcher, ProcessRunner};
//! use amdahl_sweep::{Sweep, SweepConfig};
//!
//! # async fn example() -> amdahl_sweep::Result<()> {
//! let config = SweepConfig::builder("./summation")
//!     .input_size(10_000_000)
//!     .worker_counts(vec![1, 2, 4, 8])
//!     .build()?;
//! let runner = ProcessRunner::new(config.launcher.clone());
//!
//! let report = Sweep::new(runner, config)?.run().await?;
//! print!("{}", report.dataset());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod runner;
pub mod sweep;
pub mod workload;

pub use config::SweepConfig;
pub use dataset::{Dataset, MetricsRecord, RecordStatus};
pub use error::{Error, Result};
pub use sweep::{CancelToken, Sweep, SweepReport, SweepStatus};
