//! amdahl-sweep: run a benchmark across worker counts and report its scaling

use std::path::PathBuf;
use std::process::ExitCode;

use amdahl_sweep::config::{available_cores, default_worker_counts};
use amdahl_sweep::metrics::{amdahl_curve, log_spaced_counts};
use amdahl_sweep::runner::{Launcher, ProcessRunner};
use amdahl_sweep::{Error, Sweep, SweepConfig, SweepStatus};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

/// amdahl-sweep: parallel scaling analysis for MPI-style benchmarks
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sweep a benchmark across worker counts
    Run {
        /// JSON sweep configuration (flags below override its fields)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Benchmark executable (required without --config)
        #[arg(short, long)]
        binary: Option<PathBuf>,

        /// Problem size passed to the benchmark
        #[arg(short = 'n', long)]
        input_size: Option<u64>,

        /// Comma-separated worker counts, starting at 1
        #[arg(short, long, value_delimiter = ',')]
        workers: Option<Vec<u32>>,

        /// Per-run timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Retries for timeouts and truncated output
        #[arg(long)]
        retries: Option<u32>,

        /// Successful runs per configuration (median kept)
        #[arg(long)]
        repetitions: Option<u32>,

        /// Launch the binary directly, passing the worker count in this env var
        #[arg(long, value_name = "ENV")]
        direct: Option<String>,

        /// Serial fraction for predicted speedups (inferred when omitted)
        #[arg(long)]
        serial_fraction: Option<f64>,

        /// Write the dataset as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write the dataset as Parquet
        #[arg(long)]
        parquet: Option<PathBuf>,
    },
    /// Print the theoretical Amdahl speedup curve for a serial fraction
    Predict {
        /// Serial fraction in [0, 1]
        #[arg(short, long)]
        fraction: f64,

        /// Largest worker count
        #[arg(long, default_value_t = 10_000)]
        max_workers: u32,

        /// Number of log-spaced points
        #[arg(long, default_value_t = 20)]
        points: usize,
    },
    /// Print the number of available CPU cores
    Cores,
}

#[derive(Debug, Default)]
struct RunArgs {
    config: Option<PathBuf>,
    binary: Option<PathBuf>,
    input_size: Option<u64>,
    workers: Option<Vec<u32>>,
    timeout: Option<u64>,
    retries: Option<u32>,
    repetitions: Option<u32>,
    direct: Option<String>,
    serial_fraction: Option<f64>,
}

fn build_config(args: RunArgs) -> Result<SweepConfig> {
    let mut config = match (&args.config, &args.binary) {
        (Some(path), _) => SweepConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        (None, Some(binary)) => SweepConfig::builder(binary.clone()).build()?,
        (None, None) => anyhow::bail!("either --config or --binary is required"),
    };

    if let (Some(_), Some(binary)) = (&args.config, args.binary) {
        config.binary = binary;
    }
    if let Some(n) = args.input_size {
        config.input_size = n;
    }
    if let Some(workers) = args.workers {
        config.worker_counts = workers;
    }
    if let Some(secs) = args.timeout {
        config.timeout_secs = secs;
    }
    if let Some(retries) = args.retries {
        config.retry_limit = retries;
    }
    if let Some(reps) = args.repetitions {
        config.repetitions = reps;
    }
    if let Some(workers_env) = args.direct {
        config.launcher = Launcher::Direct { workers_env };
    }
    if args.serial_fraction.is_some() {
        config.serial_fraction = args.serial_fraction;
    }
    config.validate()?;
    Ok(config)
}

async fn run_sweep(
    config: SweepConfig,
    json: Option<PathBuf>,
    parquet: Option<PathBuf>,
) -> Result<ExitCode> {
    let runner = ProcessRunner::new(config.launcher.clone());
    let sweep = Sweep::new(runner, config)?;

    let token = sweep.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current configuration");
            token.cancel();
        }
    });

    let report = match sweep.run().await {
        Ok(report) => report,
        Err(err @ Error::FatalBaseline(_)) => {
            eprintln!("fatal: {err}");
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err.into()),
    };

    print!("{}", report.dataset());
    if let Some(f) = report.model_serial_fraction() {
        println!("model serial fraction: {f:.4}");
    }
    if report.status() == SweepStatus::Cancelled {
        println!("sweep cancelled: dataset is partial");
    }

    if let Some(path) = json {
        report
            .dataset()
            .write_json(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "wrote JSON dataset");
    }
    if let Some(path) = parquet {
        report
            .dataset()
            .write_parquet(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "wrote Parquet dataset");
    }
    Ok(ExitCode::SUCCESS)
}

fn predict(fraction: f64, max_workers: u32, points: usize) -> Result<()> {
    let counts = log_spaced_counts(max_workers, points);
    let curve = amdahl_curve(fraction, &counts)
        .with_context(|| format!("serial fraction {fraction} must lie in [0, 1]"))?;
    println!("{:>8} {:>12}", "workers", "speedup");
    for (p, s) in curve {
        println!("{p:>8} {s:>12.4}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("amdahl_sweep={log_level}").into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("amdahl-sweep v{} starting", env!("CARGO_PKG_VERSION"));

    match args.command {
        Commands::Run {
            config,
            binary,
            input_size,
            workers,
            timeout,
            retries,
            repetitions,
            direct,
            serial_fraction,
            json,
            parquet,
        } => {
            let config = build_config(RunArgs {
                config,
                binary,
                input_size,
                workers,
                timeout,
                retries,
                repetitions,
                direct,
                serial_fraction,
            })?;
            run_sweep(config, json, parquet).await
        }
        Commands::Predict {
            fraction,
            max_workers,
            points,
        } => {
            predict(fraction, max_workers, points)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cores => {
            let cores = available_cores();
            println!("{cores}");
            info!(default_workers = ?default_worker_counts(cores), "available cores");
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, json: &str) -> PathBuf {
        let path = dir.path().join("sweep.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_binary_only_uses_defaults() {
        let config = build_config(RunArgs {
            binary: Some(PathBuf::from("./summation")),
            workers: Some(vec![1, 2, 4]),
            ..RunArgs::default()
        })
        .unwrap();
        assert_eq!(config.binary, PathBuf::from("./summation"));
        assert_eq!(config.worker_counts, vec![1, 2, 4]);
        assert_eq!(config.launcher, Launcher::default());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{"binary": "./from-file", "input_size": 1000, "worker_counts": [1, 2]}"#,
        );
        let config = build_config(RunArgs {
            config: Some(path),
            binary: Some(PathBuf::from("./from-flag")),
            input_size: Some(5000),
            direct: Some("OMP_NUM_THREADS".to_string()),
            serial_fraction: Some(0.25),
            ..RunArgs::default()
        })
        .unwrap();

        assert_eq!(config.binary, PathBuf::from("./from-flag"));
        assert_eq!(config.input_size, 5000);
        assert_eq!(config.worker_counts, vec![1, 2]);
        assert_eq!(
            config.launcher,
            Launcher::Direct {
                workers_env: "OMP_NUM_THREADS".to_string()
            }
        );
        assert_eq!(config.serial_fraction, Some(0.25));
    }

    #[test]
    fn test_config_file_kept_without_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{"binary": "./from-file", "worker_counts": [1, 8], "serial_fraction": 0.1}"#,
        );
        let config = build_config(RunArgs {
            config: Some(path),
            ..RunArgs::default()
        })
        .unwrap();
        assert_eq!(config.binary, PathBuf::from("./from-file"));
        assert_eq!(config.worker_counts, vec![1, 8]);
        assert_eq!(config.serial_fraction, Some(0.1));
    }

    #[test]
    fn test_overrides_are_revalidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, r#"{"binary": "./b", "worker_counts": [1, 2]}"#);
        let err = build_config(RunArgs {
            config: Some(path),
            workers: Some(vec![2, 4]),
            ..RunArgs::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("baseline 1"));

        let err = build_config(RunArgs {
            binary: Some(PathBuf::from("./b")),
            workers: Some(vec![1, 2]),
            serial_fraction: Some(1.5),
            ..RunArgs::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("outside [0, 1]"));
    }

    #[test]
    fn test_requires_config_or_binary() {
        let err = build_config(RunArgs::default()).unwrap_err();
        assert!(err.to_string().contains("--config or --binary"));
    }
}
