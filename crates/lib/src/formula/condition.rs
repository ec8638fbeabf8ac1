use std::fmt;

use serde::{Deserialize, Serialize};

use crate::options::ResolvedConfig;
use crate::platform::{Os, OsVersion, Platform};

/// A predicate over a formula's resolved options and the host platform.
///
/// In formula files a condition is a single-key table:
///
/// ```toml
/// when = { with = "opencascade" }
/// when = { without = "external-pivy" }
/// when = { os = "darwin" }
/// when = { os_below = { os = "darwin", version = "10.7" } }
/// when = { not = { os = "windows" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
  With(String),
  Without(String),
  Os(Os),
  /// The host runs `os` at a version strictly below `version`. False when the
  /// host version is unknown.
  OsBelow {
    os: Os,
    version: OsVersion,
  },
  Not(Box<Condition>),
}

impl Condition {
  pub fn holds(&self, config: &ResolvedConfig, platform: &Platform) -> bool {
    match self {
      Condition::With(option) => config.is_on(option),
      Condition::Without(option) => !config.is_on(option),
      Condition::Os(os) => platform.os == *os,
      Condition::OsBelow { os, version } => {
        platform.os == *os && platform.os_version.is_some_and(|current| current < *version)
      }
      Condition::Not(inner) => !inner.holds(config, platform),
    }
  }

  /// Option names this condition reads, for load-time validation.
  pub fn referenced_options(&self) -> Vec<&str> {
    match self {
      Condition::With(option) | Condition::Without(option) => vec![option.as_str()],
      Condition::Os(_) | Condition::OsBelow { .. } => Vec::new(),
      Condition::Not(inner) => inner.referenced_options(),
    }
  }
}

impl fmt::Display for Condition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Condition::With(option) => write!(f, "with {}", option),
      Condition::Without(option) => write!(f, "without {}", option),
      Condition::Os(os) => write!(f, "on {}", os),
      Condition::OsBelow { os, version } => write!(f, "on {} below {}", os, version),
      Condition::Not(inner) => write!(f, "not ({})", inner),
    }
  }
}
