use anyhow::{Context, Result};
use serde::Serialize;

use formulary_lib::formula::{DependencySpec, FormulaDescriptor};
use formulary_lib::util::hash::{Hashable, ObjectHash};

use crate::output::{print_heading, print_json, print_section, print_stat, truncate_hash};

use super::GlobalArgs;
use super::options::{option_views, print_options};

#[derive(Serialize)]
struct InfoView<'a> {
  hash: ObjectHash,
  #[serde(flatten)]
  formula: &'a FormulaDescriptor,
}

fn describe_dependency(dep: &DependencySpec) -> String {
  let mut line = format!("{} ({})", dep.name, dep.kind);
  for arg in &dep.args {
    line.push(' ');
    line.push_str(arg.arg());
    if let Some(condition) = arg.condition() {
      line.push_str(&format!(" [{}]", condition));
    }
  }
  if let Some(condition) = &dep.when {
    line.push_str(&format!(" when {}", condition));
  }
  line
}

/// Show a formula's metadata, options, dependencies and caveats.
pub fn cmd_info(global: &GlobalArgs, name: &str) -> Result<()> {
  let registry = global.registry()?;
  let formula = registry.load(name)?;
  let hash = formula.compute_hash().context("Failed to hash formula")?;

  if global.format.is_json() {
    return print_json(&InfoView { hash, formula });
  }

  print_heading(&formula.name, &formula.version);
  if let Some(description) = &formula.description {
    println!("{}", description);
  }
  if let Some(homepage) = &formula.homepage {
    print_stat("Homepage", homepage);
  }
  print_stat("Source", &formula.url);
  if let Some(head) = &formula.head {
    print_stat("HEAD", head);
  }
  print_stat("Hash", truncate_hash(&hash.0));

  let views = option_views(formula);
  if !views.is_empty() {
    print_section("Options");
    print_options(&views);
  }

  if !formula.dependencies.is_empty() {
    print_section("Dependencies");
    for dep in &formula.dependencies {
      println!("  {}", describe_dependency(dep));
    }
  }

  if let Some(caveats) = &formula.caveats {
    print_section("Caveats");
    println!("{}", caveats.trim_end());
  }

  Ok(())
}
