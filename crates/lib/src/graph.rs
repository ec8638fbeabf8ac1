//! Dependency graph construction.
//!
//! Starting from one or more root formulas, [`GraphBuilder`] resolves each
//! formula's options, decides which of its declared dependencies are kept,
//! and recursively expands the kept ones into a [`DependencyGraph`].
//!
//! Edges point from a dependent to its dependency and remember the order in
//! which the dependency was declared, so every later traversal is
//! deterministic regardless of how petgraph stores adjacency.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use thiserror::Error;
use tracing::debug;

use crate::formula::{DependencyKind, DependencySpec, FormulaDescriptor, Toggle};
use crate::options::{Flags, OptionError, ResolvedConfig, resolve};
use crate::platform::Platform;
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("no formula named '{0}'")]
  NotFound(String),

  #[error("{dependent} depends on '{dependency}', which is not a known formula")]
  MissingFormula { dependent: String, dependency: String },

  #[error("dependency cycle: {}", path.join(" -> "))]
  Cycle { path: Vec<String> },

  #[error("cannot resolve options for {formula}: {source}")]
  Options {
    formula: String,
    #[source]
    source: OptionError,
  },
}

/// A formula together with the configuration it will be built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaNode<'r> {
  pub descriptor: &'r FormulaDescriptor,
  pub config: ResolvedConfig,
}

impl<'r> FormulaNode<'r> {
  pub fn new(descriptor: &'r FormulaDescriptor, config: ResolvedConfig) -> Self {
    Self { descriptor, config }
  }

  pub fn name(&self) -> &'r str {
    &self.descriptor.name
  }
}

/// Why a dependent needs a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
  pub kind: DependencyKind,
  /// Variant arguments passed down after condition filtering.
  pub args: Vec<String>,
  /// Position of the dependency in the dependent's declaration list.
  pub ordinal: usize,
}

/// Formulas reachable from the requested roots.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph<'r> {
  graph: DiGraph<FormulaNode<'r>, DependencyEdge>,
  index: HashMap<String, NodeIndex>,
  roots: Vec<NodeIndex>,
}

impl<'r> DependencyGraph<'r> {
  pub fn new() -> Self {
    Self {
      graph: DiGraph::new(),
      index: HashMap::new(),
      roots: Vec::new(),
    }
  }

  /// Add a node, or return the existing node of the same name.
  pub fn add_node(&mut self, node: FormulaNode<'r>) -> NodeIndex {
    if let Some(&idx) = self.index.get(node.name()) {
      return idx;
    }
    let name = node.name().to_string();
    let idx = self.graph.add_node(node);
    self.index.insert(name, idx);
    idx
  }

  /// Record that `dependent` needs `dependency`. A second edge between the same
  /// pair is ignored; the first declaration wins.
  pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex, edge: DependencyEdge) {
    if self.graph.find_edge(dependent, dependency).is_none() {
      self.graph.add_edge(dependent, dependency, edge);
    }
  }

  pub fn add_root(&mut self, idx: NodeIndex) {
    if !self.roots.contains(&idx) {
      self.roots.push(idx);
    }
  }

  /// Roots in the order they were requested.
  pub fn roots(&self) -> &[NodeIndex] {
    &self.roots
  }

  pub fn node(&self, idx: NodeIndex) -> &FormulaNode<'r> {
    &self.graph[idx]
  }

  pub fn find(&self, name: &str) -> Option<NodeIndex> {
    self.index.get(name).copied()
  }

  /// Direct dependencies of `idx`, in declaration order.
  pub fn dependencies(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DependencyEdge)> {
    let mut deps: Vec<_> = self
      .graph
      .edges_directed(idx, Direction::Outgoing)
      .map(|e| (e.target(), e.weight()))
      .collect();
    deps.sort_by_key(|(_, edge)| edge.ordinal);
    deps
  }

  /// Every edge as `(dependent, dependency, edge)`, grouped by dependent in
  /// node insertion order.
  pub fn edges(&self) -> Vec<(&FormulaNode<'r>, &FormulaNode<'r>, &DependencyEdge)> {
    self
      .graph
      .node_indices()
      .flat_map(move |idx| {
        self
          .dependencies(idx)
          .into_iter()
          .map(move |(dep, edge)| (&self.graph[idx], &self.graph[dep], edge))
      })
      .collect()
  }

  pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &FormulaNode<'r>)> {
    self.graph.node_indices().map(|idx| (idx, &self.graph[idx]))
  }

  pub fn node_count(&self) -> usize {
    self.graph.node_count()
  }

  pub fn edge_count(&self) -> usize {
    self.graph.edge_count()
  }

  fn node_mut(&mut self, idx: NodeIndex) -> &mut FormulaNode<'r> {
    &mut self.graph[idx]
  }

  fn clear_dependencies(&mut self, idx: NodeIndex) {
    let mut edges: Vec<_> = self
      .graph
      .edges_directed(idx, Direction::Outgoing)
      .map(|e| e.id())
      .collect();
    // remove_edge moves the last edge into the freed slot
    edges.sort();
    for edge in edges.into_iter().rev() {
      self.graph.remove_edge(edge);
    }
  }

  /// Drop nodes no root reaches any more.
  fn pruned(self) -> Self {
    let mut reachable = HashSet::new();
    let mut dfs = Dfs::empty(&self.graph);
    for &root in &self.roots {
      dfs.move_to(root);
      while let Some(idx) = dfs.next(&self.graph) {
        reachable.insert(idx);
      }
    }

    if reachable.len() == self.graph.node_count() {
      return self;
    }

    let graph = self.graph.filter_map(
      |idx, node| reachable.contains(&idx).then(|| node.clone()),
      |_, edge| Some(edge.clone()),
    );
    let index: HashMap<String, NodeIndex> = graph
      .node_indices()
      .map(|idx| (graph[idx].name().to_string(), idx))
      .collect();
    let roots = self
      .roots
      .iter()
      .map(|&root| index[self.graph[root].name()])
      .collect();

    Self { graph, index, roots }
  }
}

/// Expands root formulas into a [`DependencyGraph`].
///
/// ```no_run
/// # use formulary_lib::{graph::GraphBuilder, options::Flags, platform::Platform, registry::Registry};
/// # fn demo(registry: &Registry, platform: Platform) -> Result<(), Box<dyn std::error::Error>> {
/// let flags = Flags::parse(["--with-opencascade"])?;
/// let graph = GraphBuilder::new(registry, platform).root("freecad", &flags)?.build();
/// # Ok(()) }
/// ```
pub struct GraphBuilder<'r> {
  registry: &'r Registry,
  platform: Platform,
  graph: DependencyGraph<'r>,
  stack: Vec<String>,
}

impl<'r> GraphBuilder<'r> {
  pub fn new(registry: &'r Registry, platform: Platform) -> Self {
    Self {
      registry,
      platform,
      graph: DependencyGraph::new(),
      stack: Vec::new(),
    }
  }

  /// Add a requested formula built with `flags`.
  ///
  /// # Errors
  ///
  /// - `NotFound` if `name` is not in the registry
  /// - `MissingFormula` if a kept dependency is not in the registry
  /// - `Cycle` if expansion revisits a formula it is still expanding
  /// - `Options` if flags, including flags unioned across several
  ///   dependents, do not resolve
  pub fn root(mut self, name: &str, flags: &Flags) -> Result<Self, GraphError> {
    let descriptor = self
      .registry
      .get(name)
      .ok_or_else(|| GraphError::NotFound(name.to_string()))?;
    let idx = self.visit(descriptor, flags)?;
    self.graph.add_root(idx);
    Ok(self)
  }

  pub fn build(self) -> DependencyGraph<'r> {
    self.graph.pruned()
  }

  fn visit(&mut self, descriptor: &'r FormulaDescriptor, flags: &Flags) -> Result<NodeIndex, GraphError> {
    let name = descriptor.name.as_str();

    if let Some(pos) = self.stack.iter().position(|n| n == name) {
      let mut path = self.stack[pos..].to_vec();
      path.push(name.to_string());
      return Err(GraphError::Cycle { path });
    }

    let idx = match self.graph.find(name) {
      Some(idx) => {
        let current = self.graph.node(idx).config.flags();
        if current.is_superset(flags) {
          return Ok(idx);
        }
        let merged = current.union(flags);
        debug!(formula = name, flags = %merged, "re-expanding with additional flags");
        let config = resolve_node(descriptor, &merged)?;
        self.graph.node_mut(idx).config = config;
        self.graph.clear_dependencies(idx);
        idx
      }
      None => {
        let config = resolve_node(descriptor, flags)?;
        self.graph.add_node(FormulaNode::new(descriptor, config))
      }
    };

    self.stack.push(name.to_string());
    let expanded = self.expand(idx);
    self.stack.pop();
    expanded.map(|()| idx)
  }

  fn expand(&mut self, idx: NodeIndex) -> Result<(), GraphError> {
    let node = self.graph.node(idx);
    let descriptor = node.descriptor;
    let config = node.config.clone();

    for (ordinal, dep) in descriptor.dependencies.iter().enumerate() {
      if !self.is_kept(dep, &config) {
        debug!(formula = %descriptor.name, dependency = %dep.name, kind = %dep.kind, "dependency skipped");
        continue;
      }

      let target = self.registry.get(&dep.name).ok_or_else(|| GraphError::MissingFormula {
        dependent: descriptor.name.clone(),
        dependency: dep.name.clone(),
      })?;

      let args: Vec<String> = dep
        .args
        .iter()
        .filter(|arg| arg.condition().is_none_or(|c| c.holds(&config, &self.platform)))
        .map(|arg| arg.arg().to_string())
        .collect();
      let flags = Flags::parse(&args).map_err(|source| GraphError::Options {
        formula: dep.name.clone(),
        source,
      })?;

      let dep_idx = self.visit(target, &flags)?;
      self.graph.add_dependency(
        idx,
        dep_idx,
        DependencyEdge {
          kind: dep.kind,
          args,
          ordinal,
        },
      );
    }

    Ok(())
  }

  fn is_kept(&self, dep: &DependencySpec, config: &ResolvedConfig) -> bool {
    if let Some(condition) = &dep.when
      && !condition.holds(config, &self.platform)
    {
      return false;
    }

    match dep.kind {
      DependencyKind::Build | DependencyKind::Runtime => true,
      DependencyKind::Recommended | DependencyKind::Optional => match config.toggle(&dep.name) {
        Some(Toggle::On) => true,
        Some(Toggle::Off) => false,
        None => dep.kind == DependencyKind::Recommended,
      },
    }
  }
}

fn resolve_node(descriptor: &FormulaDescriptor, flags: &Flags) -> Result<ResolvedConfig, GraphError> {
  resolve(descriptor, flags).map_err(|source| GraphError::Options {
    formula: descriptor.name.clone(),
    source,
  })
}

/// Build the graph for a single root formula.
pub fn build_graph<'r>(
  registry: &'r Registry,
  platform: Platform,
  root: &str,
  flags: &Flags,
) -> Result<DependencyGraph<'r>, GraphError> {
  Ok(GraphBuilder::new(registry, platform).root(root, flags)?.build())
}
