use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::hash::Hashable;

use super::Condition;

/// The state of a build option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
  On,
  #[default]
  Off,
}

impl Toggle {
  pub fn is_on(self) -> bool {
    matches!(self, Toggle::On)
  }
}

impl fmt::Display for Toggle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Toggle::On => write!(f, "on"),
      Toggle::Off => write!(f, "off"),
    }
  }
}

/// How a dependency participates in a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
  /// Needed only while building.
  Build,
  /// Needed at build time and at runtime.
  #[default]
  Runtime,
  /// Used unless the user passes `--without-<name>`.
  Recommended,
  /// Used only when the user passes `--with-<name>`.
  Optional,
}

impl DependencyKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      DependencyKind::Build => "build",
      DependencyKind::Runtime => "runtime",
      DependencyKind::Recommended => "recommended",
      DependencyKind::Optional => "optional",
    }
  }

  /// Default of the option implicitly declared for this kind of dependency.
  pub fn implicit_option(&self) -> Option<Toggle> {
    match self {
      DependencyKind::Build | DependencyKind::Runtime => None,
      DependencyKind::Recommended => Some(Toggle::On),
      DependencyKind::Optional => Some(Toggle::Off),
    }
  }
}

impl fmt::Display for DependencyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An argument that may be guarded by a condition: a flag passed down to a
/// dependency (`--without-framework`) or a tool argument of a step.
///
/// Written in formula files either as a bare string or as
/// `{ arg = "--without-tbb", when = { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantArg {
  Plain(String),
  Conditional { arg: String, when: Condition },
}

impl VariantArg {
  pub fn arg(&self) -> &str {
    match self {
      VariantArg::Plain(arg) | VariantArg::Conditional { arg, .. } => arg,
    }
  }

  pub fn condition(&self) -> Option<&Condition> {
    match self {
      VariantArg::Plain(_) => None,
      VariantArg::Conditional { when, .. } => Some(when),
    }
  }
}

impl From<&str> for VariantArg {
  fn from(arg: &str) -> Self {
    VariantArg::Plain(arg.to_string())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
  pub name: String,
  #[serde(default)]
  pub kind: DependencyKind,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub args: Vec<VariantArg>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub when: Option<Condition>,
}

impl DependencySpec {
  pub fn new(name: &str, kind: DependencyKind) -> Self {
    Self {
      name: name.to_string(),
      kind,
      args: Vec::new(),
      when: None,
    }
  }

  pub fn with_args<I, A>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = A>,
    A: Into<VariantArg>,
  {
    self.args = args.into_iter().map(Into::into).collect();
    self
  }

  pub fn when(mut self, condition: Condition) -> Self {
    self.when = Some(condition);
    self
  }
}

/// A user-selectable build option.
///
/// `name` carries no `with-`/`without-` prefix: an option `debug` is turned on
/// with `--with-debug` and off with `--without-debug`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub default: Toggle,
  /// Options sharing a group are mutually exclusive; exactly one is on.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub group: Option<String>,
}

impl OptionSpec {
  pub fn new(name: &str, description: &str, default: Toggle) -> Self {
    Self {
      name: name.to_string(),
      description: description.to_string(),
      default,
      group: None,
    }
  }

  pub fn in_group(mut self, group: &str) -> Self {
    self.group = Some(group.to_string());
    self
  }
}

/// Maps an option onto tool arguments for each of its states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionFlag {
  pub option: String,
  #[serde(default)]
  pub on: Vec<String>,
  #[serde(default)]
  pub off: Vec<String>,
}

impl OptionFlag {
  pub fn args(&self, toggle: Toggle) -> &[String] {
    match toggle {
      Toggle::On => &self.on,
      Toggle::Off => &self.off,
    }
  }
}

/// One external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
  pub program: String,
  /// Arguments whose condition does not hold are dropped.
  #[serde(default)]
  pub args: Vec<VariantArg>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub when: Option<Condition>,
}

impl Step {
  pub fn new<I, A>(program: &str, args: I) -> Self
  where
    I: IntoIterator<Item = A>,
    A: Into<VariantArg>,
  {
    Self {
      program: program.to_string(),
      args: args.into_iter().map(Into::into).collect(),
      env: BTreeMap::new(),
      when: None,
    }
  }

  pub fn when(mut self, condition: Condition) -> Self {
    self.when = Some(condition);
    self
  }
}

/// How a formula is built once its dependencies are installed.
///
/// `env` applies to every step; a step's own `env` wins on conflicts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub option_flags: Vec<OptionFlag>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
  #[serde(default)]
  pub steps: Vec<Step>,
}

/// A declarative package-build descriptor.
///
/// Descriptors are immutable once loaded into a
/// [`Registry`](crate::registry::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaDescriptor {
  pub name: String,
  pub version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub homepage: Option<String>,
  pub url: String,
  /// Version-control source used with `--HEAD`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub head: Option<String>,
  pub sha256: String,
  #[serde(default)]
  pub options: Vec<OptionSpec>,
  #[serde(default)]
  pub dependencies: Vec<DependencySpec>,
  #[serde(default)]
  pub procedure: Procedure,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub caveats: Option<String>,
}

impl Hashable for FormulaDescriptor {}

impl FormulaDescriptor {
  /// Declared options followed by the options implied by recommended and
  /// optional dependencies.
  ///
  /// A dependency whose name is already a declared option does not add a
  /// second one.
  pub fn effective_options(&self) -> Vec<OptionSpec> {
    let mut options = self.options.clone();

    for dep in &self.dependencies {
      let Some(default) = dep.kind.implicit_option() else {
        continue;
      };
      if options.iter().any(|o| o.name == dep.name) {
        continue;
      }
      let description = match default {
        Toggle::On => format!("Build without {} support", dep.name),
        Toggle::Off => format!("Build with {} support", dep.name),
      };
      options.push(OptionSpec::new(&dep.name, &description, default));
    }

    options
  }

  pub fn has_option(&self, name: &str) -> bool {
    self.options.iter().any(|o| o.name == name)
      || self
        .dependencies
        .iter()
        .any(|d| d.name == name && d.kind.implicit_option().is_some())
  }
}
