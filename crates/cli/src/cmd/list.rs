use anyhow::Result;
use serde::Serialize;

use crate::output::{print_heading, print_info, print_json};

use super::GlobalArgs;

#[derive(Serialize)]
struct ListEntry<'a> {
  name: &'a str,
  version: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  description: Option<&'a str>,
}

/// List every formula in the configured formula directories.
pub fn cmd_list(global: &GlobalArgs) -> Result<()> {
  let registry = global.registry()?;

  if global.format.is_json() {
    let entries: Vec<_> = registry
      .all()
      .map(|f| ListEntry {
        name: &f.name,
        version: &f.version,
        description: f.description.as_deref(),
      })
      .collect();
    return print_json(&entries);
  }

  if registry.is_empty() {
    print_info("No formulas found");
    return Ok(());
  }

  for formula in registry.all() {
    print_heading(&formula.name, &formula.version);
    if let Some(description) = &formula.description {
      println!("  {}", description);
    }
  }

  Ok(())
}
