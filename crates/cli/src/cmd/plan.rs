use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;

use formulary_lib::formula::Toggle;
use formulary_lib::options::SourceVariant;
use formulary_lib::plan::{PlanEntry, plan};

use crate::output::{print_json, print_stat};

use super::{GlobalArgs, Request, current_platform};

#[derive(Serialize)]
struct PlanEntryView<'a> {
  name: &'a str,
  version: &'a str,
  source: SourceVariant,
  /// Options moved off their defaults.
  options: BTreeMap<&'a str, Toggle>,
  dependencies: &'a [String],
}

#[derive(Serialize)]
struct PlanView<'a> {
  order: Vec<PlanEntryView<'a>>,
  /// Formulas grouped by dependency depth; a wave depends only on earlier ones.
  waves: Vec<Vec<&'a str>>,
}

fn entry_view<'a>(entry: &'a PlanEntry<'_>) -> PlanEntryView<'a> {
  PlanEntryView {
    name: entry.name(),
    version: &entry.descriptor.version,
    source: entry.config.source(),
    options: entry.config.non_default().collect(),
    dependencies: &entry.dependencies,
  }
}

/// Show the order formulas would be built in.
pub fn cmd_plan(global: &GlobalArgs, request: &Request) -> Result<()> {
  let registry = global.registry()?;
  let graph = request.graph(&registry, current_platform()?)?;
  let plan = plan(&graph).context("Failed to order build plan")?;

  if global.format.is_json() {
    let view = PlanView {
      order: plan.iter().map(entry_view).collect(),
      waves: plan
        .waves()
        .into_iter()
        .map(|wave| wave.into_iter().map(|e| e.name()).collect())
        .collect(),
    };
    return print_json(&view);
  }

  println!("Build plan ({} formulas):", plan.len());
  for (i, entry) in plan.iter().enumerate() {
    let mut line = format!("{:>3}. {} {}", i + 1, entry.name(), entry.descriptor.version);
    if entry.config.source() == SourceVariant::Head {
      line.push_str(" (HEAD)");
    }
    let options: Vec<String> = entry
      .config
      .non_default()
      .map(|(name, toggle)| format!("{}={}", name, toggle))
      .collect();
    if !options.is_empty() {
      line.push_str(&format!(" [{}]", options.join(", ")));
    }
    println!("{}", line);
  }

  println!();
  print_stat("Waves", &plan.waves().len().to_string());

  Ok(())
}
