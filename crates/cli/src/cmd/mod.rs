mod deps;
mod info;
mod install;
mod list;
mod options;
mod plan;
mod platform;

pub use deps::cmd_deps;
pub use info::cmd_info;
pub use install::cmd_install;
pub use list::cmd_list;
pub use options::cmd_options;
pub use plan::cmd_plan;
pub use platform::cmd_platform;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::debug;

use formulary_lib::graph::{DependencyGraph, GraphBuilder};
use formulary_lib::options::Flags;
use formulary_lib::platform::{Platform, paths};
use formulary_lib::registry::Registry;

use crate::output::OutputFormat;

/// Options shared by every subcommand.
///
/// Default locations are resolved on first use, so commands that never touch
/// them work without a home directory.
pub struct GlobalArgs {
  formula_dirs: Vec<PathBuf>,
  prefix: Option<PathBuf>,
  pub format: OutputFormat,
}

impl GlobalArgs {
  pub fn new(formula_dirs: Vec<PathBuf>, prefix: Option<PathBuf>, format: OutputFormat) -> Self {
    Self {
      formula_dirs,
      prefix,
      format,
    }
  }

  pub fn registry(&self) -> Result<Registry> {
    let dirs = if self.formula_dirs.is_empty() {
      paths::formula_dirs().context("Failed to locate formula directories")?
    } else {
      self.formula_dirs.clone()
    };
    debug!(dirs = ?dirs, "loading formulas");
    Registry::from_dirs(dirs.as_slice()).context("Failed to load formulas")
  }

  pub fn prefix(&self) -> Result<PathBuf> {
    match &self.prefix {
      Some(prefix) => Ok(prefix.clone()),
      None => paths::prefix_dir().context("Failed to locate install prefix"),
    }
  }
}

pub fn current_platform() -> Result<Platform> {
  Platform::current().context("Unsupported platform")
}

/// Formula names and build flags, as split out of a mixed argument list.
#[derive(Debug)]
pub struct Request {
  pub formulas: Vec<String>,
  pub flags: Flags,
}

impl Request {
  /// The flags apply to every named formula.
  pub fn new(formulas: Vec<String>, flags: &[String]) -> Result<Self> {
    if formulas.is_empty() {
      bail!("no formula named");
    }
    Ok(Self {
      formulas,
      flags: Flags::parse(flags)?,
    })
  }

  pub fn graph<'r>(&self, registry: &'r Registry, platform: Platform) -> Result<DependencyGraph<'r>> {
    let mut builder = GraphBuilder::new(registry, platform);
    for name in &self.formulas {
      builder = builder
        .root(name, &self.flags)
        .with_context(|| format!("Failed to resolve dependencies of {}", name))?;
    }
    Ok(builder.build())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use formulary_lib::options::{Flag, OptionError};

  fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn request_applies_flags() {
    let request = Request::new(args(&["freecad", "coin"]), &args(&["--with-debug", "--HEAD"])).unwrap();
    assert_eq!(request.formulas, vec!["freecad", "coin"]);
    assert!(request.flags.contains(&Flag::With("debug".into())));
    assert!(request.flags.contains(&Flag::Head));
  }

  #[test]
  fn request_rejects_malformed_flag() {
    let err = Request::new(args(&["freecad"]), &args(&["--debug"])).unwrap_err();
    assert!(matches!(
      err.downcast_ref::<OptionError>(),
      Some(OptionError::InvalidFlag(_))
    ));
  }

  #[test]
  fn request_needs_a_formula() {
    assert!(Request::new(Vec::new(), &args(&["--with-debug"])).is_err());
  }

  #[test]
  fn explicit_prefix_needs_no_home() {
    let global = GlobalArgs::new(Vec::new(), Some(PathBuf::from("/opt/formulary")), OutputFormat::Text);
    assert_eq!(global.prefix().unwrap(), PathBuf::from("/opt/formulary"));
  }
}
