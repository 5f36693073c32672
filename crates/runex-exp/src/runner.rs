use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use runex_core::errors::{ErrorInfo, RunexError};
use runex_core::{ParamValue, ParameterSet};
use tracing::info;
use uuid::Uuid;

use crate::result::RunResult;

/// Execution strategy for dispatching external-process runs.
///
/// Both strategies share the per-run procedure: a fresh unique id, an
/// exclusively owned run directory under the data dir, flag-style
/// arguments, stdout/stderr capture files, and wall-clock timing. A
/// non-zero exit is recorded in the result, never raised; only a failed
/// launch propagates as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Runner {
    /// One child process at a time, results in input order, with an
    /// optional fixed delay between consecutive runs.
    Sequential {
        /// Pause inserted between consecutive runs (throttling).
        delay: Option<Duration>,
    },
    /// Fixed-size worker pool; results surface in completion order and
    /// at most `pool_size` children are alive concurrently.
    Parallel {
        /// Number of worker threads, each owning one child at a time.
        pool_size: usize,
    },
}

impl Runner {
    /// Sequential strategy without throttling.
    pub fn sequential() -> Self {
        Runner::Sequential { delay: None }
    }

    /// Sequential strategy pausing `delay` between consecutive runs.
    pub fn sequential_with_delay(delay: Duration) -> Self {
        Runner::Sequential { delay: Some(delay) }
    }

    /// Parallel strategy with a pool of `pool_size` workers.
    pub fn parallel(pool_size: usize) -> Self {
        Runner::Parallel { pool_size }
    }

    /// Launches one run per parameter set, yielding results incrementally.
    pub fn execute(
        &self,
        command: &[String],
        data_dir: &Path,
        param_sets: Vec<ParameterSet>,
    ) -> Result<ResultStream, RunexError> {
        if command.is_empty() {
            return Err(RunexError::Runner(ErrorInfo::new(
                "empty-command",
                "campaign command vector is empty",
            )));
        }
        match self {
            Runner::Sequential { delay } => Ok(ResultStream {
                inner: StreamInner::Sequential {
                    command: command.to_vec(),
                    data_dir: data_dir.to_path_buf(),
                    queue: VecDeque::from(param_sets),
                    delay: *delay,
                    started: false,
                },
            }),
            Runner::Parallel { pool_size } => {
                if *pool_size == 0 {
                    return Err(RunexError::Runner(ErrorInfo::new(
                        "pool-size",
                        "parallel runner requires a pool of at least one worker",
                    )));
                }
                Ok(spawn_pool(command, data_dir, param_sets, *pool_size))
            }
        }
    }
}

/// Stream of run results, pulled lazily by the orchestrator.
///
/// Sequential streams launch the next child only when polled; pool
/// streams receive results from worker threads in completion order.
pub struct ResultStream {
    inner: StreamInner,
}

impl std::fmt::Debug for ResultStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream").finish_non_exhaustive()
    }
}

enum StreamInner {
    Sequential {
        command: Vec<String>,
        data_dir: PathBuf,
        queue: VecDeque<ParameterSet>,
        delay: Option<Duration>,
        started: bool,
    },
    Pool {
        rx: Receiver<Result<RunResult, RunexError>>,
        workers: Vec<JoinHandle<()>>,
    },
}

impl Iterator for ResultStream {
    type Item = Result<RunResult, RunexError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            StreamInner::Sequential {
                command,
                data_dir,
                queue,
                delay,
                started,
            } => {
                let params = queue.pop_front()?;
                if *started {
                    if let Some(delay) = delay {
                        thread::sleep(*delay);
                    }
                }
                *started = true;
                Some(run_one(command, data_dir, &params))
            }
            StreamInner::Pool { rx, workers } => match rx.recv() {
                Ok(item) => Some(item),
                Err(_) => {
                    // All senders gone: reap the workers before ending.
                    for handle in workers.drain(..) {
                        let _ = handle.join();
                    }
                    None
                }
            },
        }
    }
}

fn spawn_pool(
    command: &[String],
    data_dir: &Path,
    param_sets: Vec<ParameterSet>,
    pool_size: usize,
) -> ResultStream {
    let worker_count = pool_size.min(param_sets.len());
    let jobs = Arc::new(Mutex::new(VecDeque::from(param_sets)));
    let (tx, rx) = mpsc::channel();
    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let jobs = Arc::clone(&jobs);
        let tx = tx.clone();
        let command = command.to_vec();
        let data_dir = data_dir.to_path_buf();
        workers.push(thread::spawn(move || loop {
            let job = match jobs.lock() {
                Ok(mut queue) => queue.pop_front(),
                Err(_) => None,
            };
            let Some(params) = job else { break };
            let outcome = run_one(&command, &data_dir, &params);
            if tx.send(outcome).is_err() {
                break;
            }
        }));
    }
    drop(tx);
    ResultStream {
        inner: StreamInner::Pool { rx, workers },
    }
}

fn run_one(
    command: &[String],
    data_dir: &Path,
    params: &ParameterSet,
) -> Result<RunResult, RunexError> {
    let id = Uuid::new_v4().to_string();
    let run_dir = data_dir.join(&id);
    fs::create_dir_all(&run_dir).map_err(|err| {
        RunexError::Runner(
            ErrorInfo::new("run-dir", "failed to create run directory")
                .with_context("path", run_dir.display().to_string())
                .with_hint(err.to_string()),
        )
    })?;
    let stdout = create_capture_file(&run_dir, "stdout")?;
    let stderr = create_capture_file(&run_dir, "stderr")?;

    let args = param_args(params);
    info!(id = %id, command = %render_command(command, &args), "launching run");

    let start = Instant::now();
    let status = Command::new(&command[0])
        .args(&command[1..])
        .args(&args)
        .current_dir(&run_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .status()
        .map_err(|err| {
            RunexError::Runner(
                ErrorInfo::new("spawn", "failed to launch external command")
                    .with_context("command", command.join(" "))
                    .with_context("run", id.clone())
                    .with_hint(err.to_string()),
            )
        })?;
    let time = start.elapsed().as_secs_f64();
    let exitcode = status.code().unwrap_or(-1);
    Ok(RunResult::new(id, time, exitcode, params.clone()))
}

fn create_capture_file(run_dir: &Path, name: &str) -> Result<File, RunexError> {
    let path = run_dir.join(name);
    File::create(&path).map_err(|err| {
        RunexError::Runner(
            ErrorInfo::new("capture-file", "failed to create capture file")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })
}

/// Renders one parameter set as flag-style argument tokens: `true`
/// becomes `--name`, `false` is omitted, any other scalar becomes
/// `--name value`.
fn param_args(params: &ParameterSet) -> Vec<String> {
    let mut args = Vec::new();
    for (name, value) in params {
        match value {
            ParamValue::Bool(true) => args.push(format!("--{name}")),
            ParamValue::Bool(false) => {}
            other => {
                args.push(format!("--{name}"));
                args.push(other.to_string());
            }
        }
    }
    args
}

fn render_command(command: &[String], args: &[String]) -> String {
    let mut rendered = command.join(" ");
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}
