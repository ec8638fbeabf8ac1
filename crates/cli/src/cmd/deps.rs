use anyhow::Result;
use serde::Serialize;

use formulary_lib::formula::DependencyKind;

use crate::output::{print_info, print_json, symbols};

use super::{GlobalArgs, Request, current_platform};

#[derive(Serialize)]
struct EdgeView<'a> {
  dependent: &'a str,
  dependency: &'a str,
  kind: DependencyKind,
  args: &'a [String],
}

/// Show the dependency edges that survive option and platform resolution.
pub fn cmd_deps(global: &GlobalArgs, request: &Request) -> Result<()> {
  let registry = global.registry()?;
  let graph = request.graph(&registry, current_platform()?)?;

  let edges: Vec<_> = graph
    .edges()
    .into_iter()
    .map(|(from, to, edge)| EdgeView {
      dependent: from.name(),
      dependency: to.name(),
      kind: edge.kind,
      args: &edge.args,
    })
    .collect();

  if global.format.is_json() {
    return print_json(&edges);
  }

  if edges.is_empty() {
    print_info(&format!("{} has no dependencies", request.formulas.join(", ")));
    return Ok(());
  }

  for edge in &edges {
    let mut line = format!(
      "{} {} {} ({})",
      edge.dependent,
      symbols::ARROW,
      edge.dependency,
      edge.kind
    );
    if !edge.args.is_empty() {
      line.push(' ');
      line.push_str(&edge.args.join(" "));
    }
    println!("{}", line);
  }

  Ok(())
}
