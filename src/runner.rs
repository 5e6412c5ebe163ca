//! Benchmark runner
//!
//! Spawns the benchmark once per call, waits for it (bounded by a timeout)
//! and hands back everything it printed. A single-worker run executes the
//! binary directly; a multi-worker run goes through the configured
//! [`Launcher`], which is opaque to the rest of the pipeline.
//!
//! The child is placed in its own process group so that a timeout can take
//! down the launcher together with every worker it started.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Captured output of one benchmark invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    /// Standard output of all workers
    pub stdout: String,
    /// Standard error of all workers
    pub stderr: String,
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Wall time observed by the runner (includes launcher start-up)
    pub wall_time: Duration,
}

/// How multi-worker runs are started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Launcher {
    /// `<program> <extra_args..> -np <N> <binary> <size>`
    Mpirun {
        /// Launcher executable
        program: String,
        /// Arguments placed before `-np`
        #[serde(default)]
        extra_args: Vec<String>,
    },
    /// `<binary> <size>` with the worker count exported as `workers_env`
    Direct {
        /// Environment variable carrying the worker count
        workers_env: String,
    },
}

impl Default for Launcher {
    fn default() -> Self {
        Self::Mpirun {
            program: "mpirun".to_string(),
            extra_args: vec!["--use-hwthread-cpus".to_string()],
        }
    }
}

/// Fully resolved command line for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable to spawn
    pub program: OsString,
    /// Its arguments
    pub args: Vec<OsString>,
    /// Extra environment
    pub env: Vec<(String, String)>,
}

impl Launcher {
    /// Build the command line for `workers` workers on problem size `input_size`.
    #[must_use]
    pub fn invocation(&self, binary: &Path, input_size: u64, workers: u32) -> Invocation {
        let size = OsString::from(input_size.to_string());
        match self {
            Self::Mpirun { .. } if workers <= 1 => Invocation {
                program: binary.as_os_str().to_owned(),
                args: vec![size],
                env: Vec::new(),
            },
            Self::Mpirun {
                program,
                extra_args,
            } => {
                let mut args: Vec<OsString> = extra_args.iter().map(OsString::from).collect();
                args.push("-np".into());
                args.push(workers.to_string().into());
                args.push(binary.as_os_str().to_owned());
                args.push(size);
                Invocation {
                    program: program.into(),
                    args,
                    env: Vec::new(),
                }
            }
            Self::Direct { workers_env } => Invocation {
                program: binary.as_os_str().to_owned(),
                args: vec![size],
                env: vec![(workers_env.clone(), workers.to_string())],
            },
        }
    }
}

/// Something that can execute one benchmark configuration.
///
/// The sweep only talks to this trait, so it can be driven by scripted
/// runners in tests.
pub trait BenchmarkRunner: Send + Sync {
    /// Run `binary` on `input_size` with `workers` workers.
    ///
    /// Resolves to the captured output on exit code 0, to
    /// [`Error::RunFailure`] on a non-zero exit and to [`Error::Timeout`]
    /// once `timeout` elapses.
    fn run(
        &self,
        binary: &Path,
        input_size: u64,
        workers: u32,
        timeout: Duration,
    ) -> impl Future<Output = Result<RawOutput>> + Send;
}

/// Runs the benchmark as an OS process.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    launcher: Launcher,
    working_dir: Option<PathBuf>,
}

impl ProcessRunner {
    /// Create a runner using `launcher` for multi-worker runs.
    #[must_use]
    pub const fn new(launcher: Launcher) -> Self {
        Self {
            launcher,
            working_dir: None,
        }
    }

    /// Run the benchmark from `dir` instead of the current directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The launcher in use.
    #[must_use]
    pub const fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    async fn execute(
        &self,
        binary: &Path,
        input_size: u64,
        workers: u32,
        timeout: Duration,
    ) -> Result<RawOutput> {
        let invocation = self.launcher.invocation(binary, input_size, workers);
        debug!(
            program = ?invocation.program,
            args = ?invocation.args,
            env = ?invocation.env,
            "spawning benchmark"
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);

        let started = Instant::now();
        let child = command.spawn().map_err(|source| Error::Spawn {
            program: invocation.program.to_string_lossy().into_owned(),
            source,
        })?;
        let pid = child.id();

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                let raw = RawOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code(),
                    wall_time: started.elapsed(),
                };
                if output.status.success() {
                    Ok(raw)
                } else {
                    Err(Error::RunFailure {
                        workers,
                        code: raw.exit_code,
                        stderr: raw.stderr,
                    })
                }
            }
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                Err(Error::Timeout { workers, timeout })
            }
        }
    }
}

impl BenchmarkRunner for ProcessRunner {
    fn run(
        &self,
        binary: &Path,
        input_size: u64,
        workers: u32,
        timeout: Duration,
    ) -> impl Future<Output = Result<RawOutput>> + Send {
        self.execute(binary, input_size, workers, timeout)
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created for this child
    // by `process_group(0)`, so it never names our own group.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        warn!(
            pgid,
            error = %std::io::Error::last_os_error(),
            "failed to kill benchmark process group"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}
