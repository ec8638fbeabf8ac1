use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

use formulary_lib::execute::{
  BuildResult, ExecuteConfig, ExecuteError, ExecutionReport, Executor, HostProbe, ProcessTool,
};
use formulary_lib::plan::{BuildPlan, plan};
use formulary_lib::platform::paths;

use crate::output::{
  format_duration, print_error, print_info, print_json, print_section, print_stat, print_success, print_warning,
  symbols,
};

use super::{GlobalArgs, Request, current_platform};

/// Lines of a failing step's output shown on the terminal.
const OUTPUT_TAIL_LINES: usize = 20;

#[derive(Serialize)]
struct FailureView<'a> {
  formula: &'a str,
  error: String,
  exit_code: i32,
}

#[derive(Serialize)]
struct InstallView<'a> {
  dry_run: bool,
  completed: &'a [BuildResult],
  #[serde(skip_serializing_if = "Option::is_none")]
  failed: Option<FailureView<'a>>,
  not_run: &'a [String],
}

/// Build and install the requested formulas and their dependencies.
///
/// Returns the process exit code: 0 on success, otherwise the failing step's
/// exit code (1 when it has none).
pub fn cmd_install(global: &GlobalArgs, request: &Request, dry_run: bool, timeout: Option<Duration>) -> Result<u8> {
  let start = Instant::now();
  let registry = global.registry()?;
  let platform = current_platform()?;
  let graph = request.graph(&registry, platform)?;
  let plan = plan(&graph).context("Failed to order build plan")?;

  let prefix = global.prefix()?;
  let build_root = paths::build_dir().context("Failed to locate build directory")?;
  let mut config = ExecuteConfig::new(platform, &prefix, &build_root).dry_run(dry_run);
  if let Some(timeout) = timeout {
    config = config.with_step_timeout(timeout);
  }
  let executor = Executor::new(ProcessTool, HostProbe::new(&prefix), config);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(executor.execute(&plan));

  if global.format.is_json() {
    print_json(&InstallView {
      dry_run,
      completed: &report.completed,
      failed: report.failed.as_ref().map(|(formula, e)| FailureView {
        formula,
        error: e.to_string(),
        exit_code: e.exit_code(),
      }),
      not_run: &report.not_run,
    })?;
  } else {
    print_report(&report, &plan, request, dry_run, start.elapsed());
  }

  Ok(u8::try_from(report.exit_code()).unwrap_or(1))
}

fn print_report(report: &ExecutionReport, plan: &BuildPlan<'_>, request: &Request, dry_run: bool, elapsed: Duration) {
  for result in &report.completed {
    if dry_run {
      print_section(&format!("{} {}", result.name, result.version));
      for step in &result.steps {
        println!("  {} {}", step.program, step.args.join(" "));
      }
    } else if result.cached {
      print_info(&format!("{} {} already installed", result.name, result.version));
    } else {
      let build_time: Duration = result.steps.iter().map(|s| s.elapsed).sum();
      print_success(&format!(
        "{} {} {} {} ({})",
        result.name,
        result.version,
        symbols::ARROW,
        result.prefix.display(),
        format_duration(build_time)
      ));
    }
  }

  if let Some((_, err)) = &report.failed {
    print_error(&err.to_string());
    if let ExecuteError::StepFailed { stdout, stderr, .. } = err {
      let output = if stderr.trim().is_empty() { stdout } else { stderr };
      for line in tail(output, OUTPUT_TAIL_LINES) {
        eprintln!("  {}", line);
      }
    }
    if !report.not_run.is_empty() {
      print_warning(&format!("Not built: {}", report.not_run.join(", ")));
    }
    return;
  }

  if !dry_run {
    for name in &request.formulas {
      let caveats = plan
        .iter()
        .find(|e| e.name() == name)
        .and_then(|e| e.descriptor.caveats.as_deref());
      if let Some(caveats) = caveats {
        print_section(&format!("{} caveats", name));
        println!("{}", caveats.trim_end());
      }
    }
  }

  println!();
  let built = report.completed.iter().filter(|r| !r.cached).count();
  if dry_run {
    print_success("Dry run complete");
  } else {
    print_success("Install complete");
  }
  print_stat("Formulas", &report.completed.len().to_string());
  print_stat("Built", &built.to_string());
  print_stat("Duration", &format_duration(elapsed));
}

fn tail(text: &str, count: usize) -> impl Iterator<Item = &str> {
  let lines: Vec<&str> = text.lines().collect();
  let skip = lines.len().saturating_sub(count);
  lines.into_iter().skip(skip)
}
