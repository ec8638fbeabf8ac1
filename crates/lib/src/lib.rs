//! formulary-lib: Core types and logic for formulary
//!
//! This crate provides the engine behind the `formulary` package builder:
//! - `Registry`: read-only set of formula descriptors loaded at startup
//! - `ResolvedConfig`: per-formula option choices derived from user flags
//! - `DependencyGraph`: formulas reachable from the requested roots
//! - `BuildPlan`: deterministic, dependency-first build order
//! - `Executor`: runs each formula's build procedure through an external tool

pub mod consts;
pub mod execute;
pub mod formula;
pub mod graph;
pub mod options;
pub mod placeholder;
pub mod plan;
pub mod platform;
pub mod registry;
pub mod util;
