//! Build plan execution.
//!
//! [`Executor::execute`] walks a [`BuildPlan`] in order. For each formula it
//! materializes the procedure (conditions, option flags, placeholders), runs
//! the steps through a [`BuildTool`], and records an install receipt. The
//! first failing step stops the run; formulas already installed stay where
//! they are.

pub mod probe;
pub mod receipt;
pub mod resolver;
pub mod tool;
pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::formula::Step;
use crate::options::SourceVariant;
use crate::placeholder::{self, Placeholder, PlaceholderError, Segment, Var};
use crate::plan::{BuildPlan, PlanEntry};
use crate::platform::paths;

use probe::{EnvironmentProbe, Language};
use receipt::{read_receipt, verify_install, write_receipt};
use resolver::StepResolver;

pub use probe::{HostProbe, ProbeError};
pub use tool::{BuildTool, Invocation, ProcessTool, RecordingTool, ToolOutput};
pub use types::{Artifacts, BuildResult, ExecuteConfig, ExecuteError, ExecutionReport, StepRecord};

/// Runs build plans.
pub struct Executor<T, P> {
  tool: T,
  probe: P,
  config: ExecuteConfig,
}

impl<T: BuildTool, P: EnvironmentProbe> Executor<T, P> {
  pub fn new(tool: T, probe: P, config: ExecuteConfig) -> Self {
    Self { tool, probe, config }
  }

  pub fn config(&self) -> &ExecuteConfig {
    &self.config
  }

  pub fn tool(&self) -> &T {
    &self.tool
  }

  /// Build every entry of `plan` in order, stopping at the first failure.
  pub async fn execute(&self, plan: &BuildPlan<'_>) -> ExecutionReport {
    info!(count = plan.len(), dry_run = self.config.dry_run, "starting build execution");
    let mut report = ExecutionReport::default();

    for (pos, entry) in plan.iter().enumerate() {
      match self.build(entry, &report.completed).await {
        Ok(result) => {
          info!(formula = %result.name, cached = result.cached, "build succeeded");
          report.completed.push(result);
        }
        Err(e) => {
          error!(formula = %entry.name(), error = %e, "build failed");
          report.not_run = plan.entries()[pos + 1..]
            .iter()
            .map(|rest| rest.name().to_string())
            .collect();
          if !report.not_run.is_empty() {
            warn!(not_run = ?report.not_run, "remaining formulas were not built");
          }
          report.failed = Some((entry.name().to_string(), e));
          break;
        }
      }
    }

    info!(
      completed = report.completed.len(),
      failed = report.failed.is_some(),
      not_run = report.not_run.len(),
      "build execution finished"
    );
    report
  }

  async fn build(&self, entry: &PlanEntry<'_>, completed: &[BuildResult]) -> Result<BuildResult, ExecuteError> {
    let name = entry.name();
    let version = keg_version(entry);
    let prefix = self.config.cellar.join(name).join(&version);
    let workdir = self.config.build_root.join(format!("{name}-{version}"));

    info!(formula = %name, version = %version, prefix = ?prefix, "building");

    if let Some(result) = self.cached(entry, &prefix, &version)? {
      return Ok(result);
    }

    if !self.config.dry_run {
      create_dir(&prefix).await?;
      create_dir(&workdir).await?;
    }

    let options = materialize_flags(entry);
    let mut steps = Vec::new();

    for step in &entry.descriptor.procedure.steps {
      if let Some(condition) = &step.when
        && !condition.holds(&entry.config, &self.config.platform)
      {
        debug!(formula = %name, program = %step.program, "step condition false, skipping");
        continue;
      }

      let invocation = self.materialize(entry, step, &prefix, &workdir, &options, completed)?;

      if self.config.dry_run {
        info!(formula = %name, program = %invocation.program, args = ?invocation.args, "would run step");
        steps.push(StepRecord {
          program: invocation.program,
          args: invocation.args,
          code: None,
          elapsed: Duration::ZERO,
        });
        continue;
      }

      info!(formula = %name, program = %invocation.program, "running step");
      let output = self.tool.run(&invocation).await.map_err(|e| ExecuteError::StepFailed {
        formula: name.to_string(),
        program: invocation.program.clone(),
        code: None,
        stdout: String::new(),
        stderr: e.to_string(),
      })?;

      if !output.success() {
        warn!(formula = %name, program = %invocation.program, code = ?output.code, "step failed");
        return Err(ExecuteError::StepFailed {
          formula: name.to_string(),
          program: invocation.program,
          code: output.code,
          stdout: output.stdout,
          stderr: output.stderr,
        });
      }

      steps.push(StepRecord {
        program: invocation.program,
        args: invocation.args,
        code: output.code,
        elapsed: output.elapsed,
      });
    }

    if !self.config.dry_run {
      write_receipt(entry, &prefix).await?;
      link_opt(&self.config.prefix, name, &prefix).await?;
    }

    Ok(BuildResult {
      name: name.to_string(),
      version,
      artifacts: Artifacts::for_prefix(&prefix),
      prefix,
      steps,
      cached: false,
    })
  }

  /// Reuse an existing install whose receipt matches and whose tree is intact.
  fn cached(&self, entry: &PlanEntry<'_>, prefix: &Path, version: &str) -> Result<Option<BuildResult>, ExecuteError> {
    let receipt = match read_receipt(prefix) {
      Ok(Some(receipt)) => receipt,
      Ok(None) => return Ok(None),
      Err(e) => {
        warn!(formula = %entry.name(), error = %e, "ignoring unreadable install receipt");
        return Ok(None);
      }
    };
    if !receipt.matches(entry)? {
      debug!(formula = %entry.name(), "receipt is for a different configuration, rebuilding");
      return Ok(None);
    }
    if !verify_install(prefix, &receipt) {
      return Ok(None);
    }

    info!(formula = %entry.name(), "already installed");
    Ok(Some(BuildResult {
      name: entry.name().to_string(),
      version: version.to_string(),
      prefix: prefix.to_path_buf(),
      artifacts: Artifacts::for_prefix(prefix),
      steps: Vec::new(),
      cached: true,
    }))
  }

  /// Turn a procedure step into an invocation.
  ///
  /// An argument consisting solely of `$${options}` expands to one argument
  /// per materialized flag; everywhere else placeholders substitute in place.
  pub fn materialize(
    &self,
    entry: &PlanEntry<'_>,
    step: &Step,
    prefix: &Path,
    workdir: &Path,
    options: &[String],
    completed: &[BuildResult],
  ) -> Result<Invocation, ExecuteError> {
    let formula = entry.name();
    let placeholder_err = |source: PlaceholderError| ExecuteError::Placeholder {
      formula: formula.to_string(),
      source,
    };

    let program = placeholder::parse(&step.program).map_err(placeholder_err)?;
    let args = step
      .args
      .iter()
      .filter(|arg| {
        arg
          .condition()
          .is_none_or(|condition| condition.holds(&entry.config, &self.config.platform))
      })
      .map(|arg| placeholder::parse(arg.arg()))
      .collect::<Result<Vec<_>, _>>()
      .map_err(placeholder_err)?;
    let mut env = BTreeMap::new();
    for (key, value) in entry.descriptor.procedure.env.iter().chain(&step.env) {
      env.insert(key.clone(), placeholder::parse(value).map_err(placeholder_err)?);
    }

    let mut compilers = HashMap::new();
    for segment in program.iter().chain(args.iter().flatten()).chain(env.values().flatten()) {
      if let Segment::Placeholder(Placeholder::Compiler(language)) = segment
        && !compilers.contains_key(language)
      {
        let probe_err = |source| ExecuteError::Probe {
          formula: formula.to_string(),
          source,
        };
        let path = language
          .parse::<Language>()
          .and_then(|lang| self.probe.compiler_path(lang))
          .map_err(probe_err)?;
        debug!(formula, %language, path = ?path, "probed compiler");
        compilers.insert(language.clone(), path);
      }
    }

    let resolver = StepResolver {
      name: formula,
      version: &entry.descriptor.version,
      prefix,
      workdir,
      options,
      install_root: &self.config.prefix,
      completed,
      probe: &self.probe,
      compilers: &compilers,
    };
    let substitute = |segments: &[Segment]| placeholder::substitute_segments(segments, &resolver);

    let mut materialized_args = Vec::new();
    for segments in &args {
      if let [Segment::Placeholder(Placeholder::Var(Var::Options))] = segments.as_slice() {
        materialized_args.extend(options.iter().cloned());
      } else {
        materialized_args.push(substitute(segments).map_err(placeholder_err)?);
      }
    }

    let env = env
      .iter()
      .map(|(key, segments)| Ok((key.clone(), substitute(segments).map_err(placeholder_err)?)))
      .collect::<Result<BTreeMap<_, _>, ExecuteError>>()?;

    Ok(Invocation {
      formula: formula.to_string(),
      program: substitute(&program).map_err(placeholder_err)?,
      args: materialized_args,
      cwd: workdir.to_path_buf(),
      env,
      timeout: self.config.step_timeout,
    })
  }
}

/// Tool arguments selected by the entry's resolved options, in declaration
/// order of the procedure's `option_flags`.
pub fn materialize_flags(entry: &PlanEntry<'_>) -> Vec<String> {
  let mut flags = Vec::new();
  for flag in &entry.descriptor.procedure.option_flags {
    match entry.config.toggle(&flag.option) {
      Some(toggle) => flags.extend(flag.args(toggle).iter().cloned()),
      None => warn!(formula = %entry.name(), option = %flag.option, "option flag names no resolved option"),
    }
  }
  flags
}

/// Directory name for an install: the version, or `HEAD` for head builds.
fn keg_version(entry: &PlanEntry<'_>) -> String {
  match entry.config.source() {
    SourceVariant::Stable => entry.descriptor.version.clone(),
    SourceVariant::Head => "HEAD".to_string(),
  }
}

async fn create_dir(path: &Path) -> Result<(), ExecuteError> {
  tokio::fs::create_dir_all(path).await.map_err(|source| ExecuteError::Io {
    path: path.to_path_buf(),
    source,
  })
}

/// Point `<prefix>/opt/<name>` at the freshly installed keg.
async fn link_opt(install_root: &Path, name: &str, keg: &Path) -> Result<(), ExecuteError> {
  let link = paths::opt_dir(install_root, name);
  let io_err = |source| ExecuteError::Io {
    path: link.clone(),
    source,
  };

  if let Some(parent) = link.parent() {
    create_dir(parent).await?;
  }
  if tokio::fs::symlink_metadata(&link).await.is_ok() {
    tokio::fs::remove_file(&link).await.map_err(io_err)?;
  }

  #[cfg(unix)]
  tokio::fs::symlink(keg, &link).await.map_err(io_err)?;

  #[cfg(windows)]
  tokio::fs::symlink_dir(keg, &link).await.map_err(io_err)?;

  debug!(link = ?link, target = ?keg, "linked opt prefix");
  Ok(())
}
