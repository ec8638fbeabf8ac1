//! Formula descriptors.
//!
//! A formula declares where a package's source lives, which other formulas it
//! depends on, which options a user may toggle, and the external tool steps
//! that build it. Formulas are plain data: nothing in this module runs a
//! build or touches the registry.
//!
//! # Submodules
//!
//! - [`condition`] - predicates gating dependencies, variant args and steps

pub mod condition;
mod types;

pub use condition::Condition;
pub use types::*;
