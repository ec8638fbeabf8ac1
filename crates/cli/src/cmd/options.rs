use anyhow::Result;
use serde::Serialize;

use formulary_lib::formula::{FormulaDescriptor, OptionSpec, Toggle};
use formulary_lib::options::Flag;

use crate::output::{print_info, print_json};

use super::GlobalArgs;

#[derive(Serialize)]
pub(super) struct OptionView {
  name: String,
  /// The flag that moves the option away from its default.
  flag: String,
  description: String,
  default: Toggle,
  #[serde(skip_serializing_if = "Option::is_none")]
  group: Option<String>,
}

impl From<OptionSpec> for OptionView {
  fn from(spec: OptionSpec) -> Self {
    let flag = match spec.default {
      Toggle::On => Flag::Without(spec.name.clone()),
      Toggle::Off => Flag::With(spec.name.clone()),
    };
    Self {
      flag: flag.to_string(),
      name: spec.name,
      description: spec.description,
      default: spec.default,
      group: spec.group,
    }
  }
}

/// Effective options of a formula, plus `--HEAD` when it has a HEAD source.
pub(super) fn option_views(formula: &FormulaDescriptor) -> Vec<OptionView> {
  let mut views: Vec<OptionView> = formula.effective_options().into_iter().map(Into::into).collect();
  if formula.head.is_some() {
    views.push(OptionView {
      name: "HEAD".to_string(),
      flag: Flag::Head.to_string(),
      description: "Install HEAD version".to_string(),
      default: Toggle::Off,
      group: None,
    });
  }
  views
}

pub(super) fn print_options(views: &[OptionView]) {
  for view in views {
    match &view.group {
      Some(group) => println!("{}  [{}]", view.flag, group),
      None => println!("{}", view.flag),
    }
    println!("\t{}", view.description);
  }
}

/// Show the options a formula accepts.
pub fn cmd_options(global: &GlobalArgs, name: &str) -> Result<()> {
  let registry = global.registry()?;
  let formula = registry.load(name)?;
  let views = option_views(formula);

  if global.format.is_json() {
    return print_json(&views);
  }

  if views.is_empty() {
    print_info(&format!("{} has no options", formula.name));
    return Ok(());
  }

  print_options(&views);
  Ok(())
}
