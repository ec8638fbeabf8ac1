//! Types for build plan execution.
//!
//! This module defines the error types, result types, and configuration
//! for running the procedures of a build plan.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::placeholder::PlaceholderError;
use crate::platform::{Platform, paths};

use super::probe::ProbeError;
use super::receipt::ReceiptError;

/// Errors that can occur while building a formula.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// A step exited non-zero, could not be spawned, or timed out.
  #[error("{formula}: `{program}` failed ({})", describe_code(*code))]
  StepFailed {
    formula: String,
    program: String,
    code: Option<i32>,
    stdout: String,
    stderr: String,
  },

  /// A step argument referenced something that could not be resolved.
  #[error("{formula}: {source}")]
  Placeholder {
    formula: String,
    #[source]
    source: PlaceholderError,
  },

  /// The environment probe could not locate a tool.
  #[error("{formula}: {source}")]
  Probe {
    formula: String,
    #[source]
    source: ProbeError,
  },

  #[error("failed to prepare {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("install receipt: {0}")]
  Receipt(#[from] ReceiptError),
}

fn describe_code(code: Option<i32>) -> String {
  match code {
    Some(code) => format!("exit code {code}"),
    None => "no exit code".to_string(),
  }
}

impl ExecuteError {
  /// Process exit code the CLI reports for this failure.
  pub fn exit_code(&self) -> i32 {
    match self {
      ExecuteError::StepFailed { code: Some(code), .. } if *code != 0 => *code,
      _ => 1,
    }
  }
}

/// Standard artifact directories inside an install prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifacts {
  pub bin: PathBuf,
  pub include: PathBuf,
  pub lib: PathBuf,
}

impl Artifacts {
  pub fn for_prefix(prefix: &Path) -> Self {
    Self {
      bin: prefix.join("bin"),
      include: prefix.join("include"),
      lib: prefix.join("lib"),
    }
  }
}

/// A step that ran (or would have run, in a dry run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
  pub program: String,
  pub args: Vec<String>,
  /// `None` for dry runs.
  pub code: Option<i32>,
  pub elapsed: Duration,
}

/// Result of building a single formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
  pub name: String,
  pub version: String,
  /// `<cellar>/<name>/<version>`
  pub prefix: PathBuf,
  pub artifacts: Artifacts,
  pub steps: Vec<StepRecord>,
  /// True when a verified install was found and no step ran.
  pub cached: bool,
}

/// Outcome of executing a build plan.
#[derive(Debug, Default)]
pub struct ExecutionReport {
  /// Formulas built successfully, in plan order.
  pub completed: Vec<BuildResult>,

  /// The formula that failed, if any. Execution stops at the first failure.
  pub failed: Option<(String, ExecuteError)>,

  /// Formulas after the failure that were never started.
  pub not_run: Vec<String>,
}

impl ExecutionReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_none()
  }

  /// 0 on success, otherwise the failing formula's exit code.
  pub fn exit_code(&self) -> i32 {
    self.failed.as_ref().map_or(0, |(_, err)| err.exit_code())
  }

  pub fn total(&self) -> usize {
    self.completed.len() + self.failed.iter().count() + self.not_run.len()
  }

  pub fn result(&self, name: &str) -> Option<&BuildResult> {
    self.completed.iter().find(|r| r.name == name)
  }
}

/// Configuration for build execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// The host conditions are evaluated against.
  pub platform: Platform,

  /// Install prefix; holds the cellar and the `opt` links.
  pub prefix: PathBuf,

  /// Directory holding `<name>/<version>` install prefixes.
  pub cellar: PathBuf,

  /// Directory holding per-formula working directories.
  pub build_root: PathBuf,

  /// Kill a step that runs longer than this.
  pub step_timeout: Option<Duration>,

  /// Materialize every step but spawn nothing and write nothing.
  pub dry_run: bool,
}

impl ExecuteConfig {
  pub fn new(platform: Platform, prefix: &Path, build_root: &Path) -> Self {
    Self {
      platform,
      prefix: prefix.to_path_buf(),
      cellar: paths::cellar_dir(prefix),
      build_root: build_root.to_path_buf(),
      step_timeout: None,
      dry_run: false,
    }
  }

  pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
    self.step_timeout = Some(timeout);
    self
  }

  pub fn dry_run(mut self, dry_run: bool) -> Self {
    self.dry_run = dry_run;
    self
  }
}
