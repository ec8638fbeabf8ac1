//! Topological build planning.
//!
//! [`plan`] walks a [`DependencyGraph`] depth-first from each root, in root
//! order, following dependencies in declaration order and emitting formulas
//! in post-order. A formula reached along several paths is emitted once, at
//! the position of its first completion, so every dependency precedes its
//! dependents and ties are broken by discovery order.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use thiserror::Error;
use tracing::debug;

use crate::formula::FormulaDescriptor;
use crate::graph::DependencyGraph;
use crate::options::ResolvedConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
  #[error("dependency cycle: {}", path.join(" -> "))]
  Cycle { path: Vec<String> },

  #[error("graph has no node {0}")]
  UnknownNode(usize),
}

/// One formula to build, with the configuration it is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry<'r> {
  pub descriptor: &'r FormulaDescriptor,
  pub config: ResolvedConfig,
  /// Names of direct dependencies, in declaration order.
  pub dependencies: Vec<String>,
}

impl PlanEntry<'_> {
  pub fn name(&self) -> &str {
    &self.descriptor.name
  }
}

/// An ordered build plan; every entry's dependencies appear before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlan<'r> {
  entries: Vec<PlanEntry<'r>>,
}

impl<'r> BuildPlan<'r> {
  pub fn entries(&self) -> &[PlanEntry<'r>] {
    &self.entries
  }

  pub fn iter(&self) -> impl Iterator<Item = &PlanEntry<'r>> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn names(&self) -> Vec<&str> {
    self.entries.iter().map(PlanEntry::name).collect()
  }

  pub fn position(&self, name: &str) -> Option<usize> {
    self.entries.iter().position(|e| e.name() == name)
  }

  /// Group entries into dependency levels.
  ///
  /// Wave 0 holds formulas with no dependencies in the plan; every other
  /// formula sits one wave after its deepest dependency. Formulas within a
  /// wave could be built concurrently. Order inside a wave follows the plan.
  pub fn waves(&self) -> Vec<Vec<&PlanEntry<'r>>> {
    let mut levels: HashMap<&str, usize> = HashMap::new();
    let mut waves: Vec<Vec<&PlanEntry<'r>>> = Vec::new();

    for entry in &self.entries {
      let level = entry
        .dependencies
        .iter()
        .filter_map(|dep| levels.get(dep.as_str()))
        .map(|level| level + 1)
        .max()
        .unwrap_or(0);
      levels.insert(entry.name(), level);

      if waves.len() <= level {
        waves.resize_with(level + 1, Vec::new);
      }
      waves[level].push(entry);
    }

    waves
  }
}

impl<'a, 'r> IntoIterator for &'a BuildPlan<'r> {
  type Item = &'a PlanEntry<'r>;
  type IntoIter = std::slice::Iter<'a, PlanEntry<'r>>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.iter()
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VisitState {
  Visiting,
  Visited,
}

struct Planner<'g, 'r> {
  graph: &'g DependencyGraph<'r>,
  states: HashMap<NodeIndex, VisitState>,
  stack: Vec<NodeIndex>,
  order: Vec<NodeIndex>,
}

impl<'g, 'r> Planner<'g, 'r> {
  fn visit(&mut self, idx: NodeIndex) -> Result<(), PlanError> {
    match self.states.get(&idx) {
      Some(VisitState::Visited) => return Ok(()),
      Some(VisitState::Visiting) => {
        let start = self.stack.iter().position(|&n| n == idx).unwrap_or(0);
        let mut path: Vec<String> = self.stack[start..]
          .iter()
          .map(|&n| self.graph.node(n).name().to_string())
          .collect();
        path.push(self.graph.node(idx).name().to_string());
        return Err(PlanError::Cycle { path });
      }
      None => {
        self.states.insert(idx, VisitState::Visiting);
      }
    }

    self.stack.push(idx);
    for (dep, _) in self.graph.dependencies(idx) {
      self.visit(dep)?;
    }
    self.stack.pop();

    self.states.insert(idx, VisitState::Visited);
    self.order.push(idx);
    Ok(())
  }
}

/// Compute the build order for `graph`.
///
/// # Errors
///
/// `Cycle` if the graph is not acyclic, `UnknownNode` if a root does not
/// belong to the graph.
pub fn plan<'r>(graph: &DependencyGraph<'r>) -> Result<BuildPlan<'r>, PlanError> {
  let mut planner = Planner {
    graph,
    states: HashMap::new(),
    stack: Vec::new(),
    order: Vec::new(),
  };

  for &root in graph.roots() {
    if root.index() >= graph.node_count() {
      return Err(PlanError::UnknownNode(root.index()));
    }
    planner.visit(root)?;
  }

  let entries: Vec<PlanEntry<'r>> = planner
    .order
    .into_iter()
    .map(|idx| {
      let node = graph.node(idx);
      PlanEntry {
        descriptor: node.descriptor,
        config: node.config.clone(),
        dependencies: graph
          .dependencies(idx)
          .into_iter()
          .map(|(dep, _)| graph.node(dep).name().to_string())
          .collect(),
      }
    })
    .collect();

  debug!(
    order = ?entries.iter().map(PlanEntry::name).collect::<Vec<_>>(),
    "computed build plan"
  );
  Ok(BuildPlan { entries })
}
