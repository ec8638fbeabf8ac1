//! The external build tool boundary.
//!
//! The executor never interprets what a step does. It hands an
//! [`Invocation`] to a [`BuildTool`] and looks only at the exit code.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

/// Variables copied from the caller's environment into every step.
const PASSTHROUGH_ENV: &[&str] = &["PATH", "HOME", "TMPDIR"];

/// One fully materialized step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  /// The formula this step builds; informational.
  pub formula: String,
  pub program: String,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  pub env: BTreeMap<String, String>,
  pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
  /// `None` when the process was terminated by a signal.
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  pub elapsed: Duration,
}

impl ToolOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Runs build steps.
pub trait BuildTool {
  /// Run one step to completion.
  ///
  /// An `Err` means the step never produced an exit status: it could not be
  /// spawned, or it was killed after exceeding its timeout.
  fn run(&self, invocation: &Invocation) -> impl Future<Output = io::Result<ToolOutput>>;
}

/// Spawns real processes with a scrubbed environment.
///
/// The child sees only `PATH`, `HOME` and `TMPDIR` from the caller, a `C`
/// locale, a fixed `SOURCE_DATE_EPOCH`, and the step's own variables. It is
/// killed if the future is dropped, so a timeout never leaks a process.
#[derive(Debug, Clone, Default)]
pub struct ProcessTool;

impl BuildTool for ProcessTool {
  async fn run(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
    let mut command = Command::new(&invocation.program);
    command.args(&invocation.args).current_dir(&invocation.cwd).env_clear();

    for key in PASSTHROUGH_ENV {
      if let Some(value) = std::env::var_os(key) {
        command.env(key, value);
      }
    }

    command
      .env("LANG", "C")
      .env("LC_ALL", "C")
      // 1980-01-01, the ZIP epoch
      .env("SOURCE_DATE_EPOCH", "315532800")
      .envs(&invocation.env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    debug!(program = %invocation.program, cwd = ?invocation.cwd, "spawning process");

    let start = Instant::now();
    let child = command.spawn()?;
    let output = match invocation.timeout {
      Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| {
          io::Error::new(
            io::ErrorKind::TimedOut,
            format!("timed out after {}s", limit.as_secs_f64()),
          )
        })??,
      None => child.wait_with_output().await?,
    };

    let result = ToolOutput {
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
      elapsed: start.elapsed(),
    };

    if !result.stdout.is_empty() {
      debug!(stdout = %result.stdout, "command stdout");
    }
    if !result.stderr.is_empty() {
      debug!(stderr = %result.stderr, "command stderr");
    }

    Ok(result)
  }
}

/// Records invocations instead of running them.
///
/// Every step succeeds unless its formula was registered with
/// [`RecordingTool::fail`], in which case it exits with that code.
#[derive(Debug, Default)]
pub struct RecordingTool {
  invocations: Mutex<Vec<Invocation>>,
  failures: HashMap<String, i32>,
}

impl RecordingTool {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every step of `formula` exit with `code`.
  pub fn fail(mut self, formula: &str, code: i32) -> Self {
    self.failures.insert(formula.to_string(), code);
    self
  }

  /// Invocations seen so far, in order.
  pub fn invocations(&self) -> Vec<Invocation> {
    self.invocations.lock().map(|v| v.clone()).unwrap_or_default()
  }
}

impl BuildTool for RecordingTool {
  async fn run(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
    if let Ok(mut invocations) = self.invocations.lock() {
      invocations.push(invocation.clone());
    }
    let code = self.failures.get(&invocation.formula).copied().unwrap_or(0);
    Ok(ToolOutput {
      code: Some(code),
      stdout: String::new(),
      stderr: if code == 0 { String::new() } else { format!("{} failed", invocation.program) },
      elapsed: Duration::ZERO,
    })
  }
}
