//! Option resolution.
//!
//! Turns the flags a user (or a dependent formula) passes for one formula into
//! a [`ResolvedConfig`]: every effective option mapped to a [`Toggle`], with
//! mutually exclusive groups collapsed to exactly one active member.
//!
//! Resolution is a pure function of the descriptor and the flag set.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::formula::{FormulaDescriptor, OptionSpec};
use crate::util::hash::Hashable;

pub use crate::formula::Toggle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
  #[error("{formula}: unknown option '{option}'")]
  Unknown { formula: String, option: String },

  #[error("invalid flag '{0}': expected --with-<option>, --without-<option> or --HEAD")]
  InvalidFlag(String),

  #[error("{formula}: options '{first}' and '{second}' conflict")]
  Conflict {
    formula: String,
    first: String,
    second: String,
  },

  #[error("{formula}: every option in group '{group}' was disabled")]
  EmptyGroup { formula: String, group: String },

  #[error("{formula}: no HEAD source is declared")]
  NoHead { formula: String },
}

/// A single parsed build flag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Flag {
  With(String),
  Without(String),
  Head,
}

impl FromStr for Flag {
  type Err = OptionError;

  /// Accepts `--with-X`, `--without-X` and `--HEAD`; the leading dashes are
  /// optional.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let body = s.trim().trim_start_matches('-');
    let invalid = || OptionError::InvalidFlag(s.to_string());

    if body == "HEAD" {
      return Ok(Flag::Head);
    }
    if let Some(name) = body.strip_prefix("without-") {
      return if name.is_empty() { Err(invalid()) } else { Ok(Flag::Without(name.to_string())) };
    }
    if let Some(name) = body.strip_prefix("with-") {
      return if name.is_empty() { Err(invalid()) } else { Ok(Flag::With(name.to_string())) };
    }
    Err(invalid())
  }
}

impl fmt::Display for Flag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Flag::With(name) => write!(f, "--with-{}", name),
      Flag::Without(name) => write!(f, "--without-{}", name),
      Flag::Head => write!(f, "--HEAD"),
    }
  }
}

/// An ordered, deduplicated set of flags for one formula.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flags(BTreeSet<Flag>);

impl Flags {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn parse<I, S>(flags: I) -> Result<Self, OptionError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    flags
      .into_iter()
      .map(|f| f.as_ref().parse())
      .collect::<Result<BTreeSet<_>, _>>()
      .map(Self)
  }

  pub fn insert(&mut self, flag: Flag) -> bool {
    self.0.insert(flag)
  }

  pub fn contains(&self, flag: &Flag) -> bool {
    self.0.contains(flag)
  }

  pub fn is_superset(&self, other: &Flags) -> bool {
    self.0.is_superset(&other.0)
  }

  pub fn union(&self, other: &Flags) -> Flags {
    Flags(self.0.union(&other.0).cloned().collect())
  }

  pub fn iter(&self) -> impl Iterator<Item = &Flag> {
    self.0.iter()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  fn enables(&self, option: &str) -> bool {
    self.0.contains(&Flag::With(option.to_string()))
  }

  fn disables(&self, option: &str) -> bool {
    self.0.contains(&Flag::Without(option.to_string()))
  }
}

impl FromIterator<Flag> for Flags {
  fn from_iter<T: IntoIterator<Item = Flag>>(iter: T) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl fmt::Display for Flags {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for flag in &self.0 {
      if !first {
        f.write_str(" ")?;
      }
      write!(f, "{}", flag)?;
      first = false;
    }
    Ok(())
  }
}

/// Why an option ended up in its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
  /// The option's declared default.
  Default,
  /// An explicit `--with-`/`--without-` flag.
  User,
  /// Decided by its exclusive group (another member was chosen, or the
  /// default member was disabled).
  Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionValue {
  pub toggle: Toggle,
  pub origin: Origin,
}

/// Which source a formula is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceVariant {
  #[default]
  Stable,
  Head,
}

/// Per-build snapshot of a formula's option choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConfig {
  formula: String,
  values: BTreeMap<String, OptionValue>,
  source: SourceVariant,
  flags: Flags,
}

impl Hashable for ResolvedConfig {}

impl ResolvedConfig {
  pub fn formula(&self) -> &str {
    &self.formula
  }

  pub fn toggle(&self, option: &str) -> Option<Toggle> {
    self.values.get(option).map(|v| v.toggle)
  }

  pub fn value(&self, option: &str) -> Option<OptionValue> {
    self.values.get(option).copied()
  }

  /// True only for a known option that is on.
  pub fn is_on(&self, option: &str) -> bool {
    matches!(self.toggle(option), Some(Toggle::On))
  }

  pub fn source(&self) -> SourceVariant {
    self.source
  }

  /// The flags this config was resolved from.
  pub fn flags(&self) -> &Flags {
    &self.flags
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, OptionValue)> {
    self.values.iter().map(|(name, value)| (name.as_str(), *value))
  }

  /// Options not left at their declared default by the resolver.
  pub fn non_default(&self) -> impl Iterator<Item = (&str, Toggle)> {
    self
      .values
      .iter()
      .filter(|(_, v)| v.origin != Origin::Default)
      .map(|(name, v)| (name.as_str(), v.toggle))
  }
}

/// Resolve `flags` against the options `descriptor` declares.
///
/// # Errors
///
/// - `Unknown` for a flag naming an option the formula does not have
/// - `Conflict` for `--with-X` together with `--without-X`, or for two
///   enabled members of one exclusive group
/// - `EmptyGroup` when every member of a group was disabled
/// - `NoHead` for `--HEAD` on a formula without a head source
pub fn resolve(descriptor: &FormulaDescriptor, flags: &Flags) -> Result<ResolvedConfig, OptionError> {
  let formula = descriptor.name.as_str();
  let options = descriptor.effective_options();

  let mut source = SourceVariant::Stable;
  for flag in flags.iter() {
    match flag {
      Flag::With(name) | Flag::Without(name) => {
        if !options.iter().any(|o| &o.name == name) {
          return Err(OptionError::Unknown {
            formula: formula.to_string(),
            option: name.clone(),
          });
        }
        if flags.enables(name) && flags.disables(name) {
          return Err(OptionError::Conflict {
            formula: formula.to_string(),
            first: format!("with-{}", name),
            second: format!("without-{}", name),
          });
        }
      }
      Flag::Head => {
        if descriptor.head.is_none() {
          return Err(OptionError::NoHead {
            formula: formula.to_string(),
          });
        }
        source = SourceVariant::Head;
      }
    }
  }

  let mut values = BTreeMap::new();
  let mut groups: Vec<(&str, Vec<&OptionSpec>)> = Vec::new();

  for option in &options {
    match option.group.as_deref() {
      Some(group) => match groups.iter_mut().find(|(name, _)| *name == group) {
        Some((_, members)) => members.push(option),
        None => groups.push((group, vec![option])),
      },
      None => {
        let value = if flags.enables(&option.name) {
          OptionValue {
            toggle: Toggle::On,
            origin: Origin::User,
          }
        } else if flags.disables(&option.name) {
          OptionValue {
            toggle: Toggle::Off,
            origin: Origin::User,
          }
        } else {
          OptionValue {
            toggle: option.default,
            origin: Origin::Default,
          }
        };
        values.insert(option.name.clone(), value);
      }
    }
  }

  for (group, members) in groups {
    let (selected, origin) = select_group_member(formula, group, &members, flags)?;
    debug!(formula, group, selected = %selected.name, ?origin, "resolved exclusive group");

    for member in members {
      let value = if member.name == selected.name {
        OptionValue { toggle: Toggle::On, origin }
      } else if flags.disables(&member.name) {
        OptionValue {
          toggle: Toggle::Off,
          origin: Origin::User,
        }
      } else if member.default.is_on() {
        OptionValue {
          toggle: Toggle::Off,
          origin: Origin::Group,
        }
      } else {
        OptionValue {
          toggle: Toggle::Off,
          origin: Origin::Default,
        }
      };
      values.insert(member.name.clone(), value);
    }
  }

  Ok(ResolvedConfig {
    formula: formula.to_string(),
    values,
    source,
    flags: flags.clone(),
  })
}

fn select_group_member<'o>(
  formula: &str,
  group: &str,
  members: &[&'o OptionSpec],
  flags: &Flags,
) -> Result<(&'o OptionSpec, Origin), OptionError> {
  let mut enabled = members.iter().filter(|m| flags.enables(&m.name));
  if let Some(first) = enabled.next() {
    if let Some(second) = enabled.next() {
      return Err(OptionError::Conflict {
        formula: formula.to_string(),
        first: first.name.clone(),
        second: second.name.clone(),
      });
    }
    return Ok((*first, Origin::User));
  }

  if let Some(default) = members.iter().find(|m| m.default.is_on())
    && !flags.disables(&default.name)
  {
    return Ok((*default, Origin::Default));
  }

  members
    .iter()
    .find(|m| !flags.disables(&m.name))
    .map(|m| (*m, Origin::Group))
    .ok_or_else(|| OptionError::EmptyGroup {
      formula: formula.to_string(),
      group: group.to_string(),
    })
}
