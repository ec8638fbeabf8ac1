//! Host platform detection.
//!
//! Formulas express OS-specific behavior as data (see
//! [`Condition`](crate::formula::Condition)); this module supplies the facts
//! those conditions are evaluated against. Nothing here assumes a particular
//! operating system.

pub mod os;
pub mod paths;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use os::{Os, OsVersion, OsVersionError};

/// CPU architecture variants supported by formulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
  X86_64,
  Aarch64,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// The host a build plan is resolved and executed for.
///
/// `os_version` is optional: when it is unknown, version-bounded conditions
/// are false rather than guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
  pub os_version: Option<OsVersion>,
}

impl Platform {
  /// Create a platform with no known OS version.
  pub fn new(arch: Arch, os: Os) -> Self {
    Self {
      arch,
      os,
      os_version: None,
    }
  }

  pub fn with_os_version(mut self, version: OsVersion) -> Self {
    self.os_version = Some(version);
    self
  }

  /// Detect the current platform at runtime, including the OS version.
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    let os = Os::current()?;
    Some(Self {
      arch: Arch::current()?,
      os,
      os_version: OsVersion::detect(os),
    })
  }

  /// Returns the platform triple string (e.g., "aarch64-darwin")
  pub fn triple(&self) -> String {
    format!("{}-{}", self.arch, self.os)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.os_version {
      Some(version) => write!(f, "{} ({})", self.triple(), version),
      None => write!(f, "{}", self.triple()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn platform_triple_format() {
    let platform = Platform::new(Arch::Aarch64, Os::MacOs);
    assert_eq!(platform.triple(), "aarch64-darwin");

    let platform = Platform::new(Arch::X86_64, Os::Linux);
    assert_eq!(platform.triple(), "x86_64-linux");
  }

  #[test]
  fn display_includes_known_version() {
    let platform = Platform::new(Arch::X86_64, Os::MacOs).with_os_version(OsVersion::new(10, 6, 8));
    assert_eq!(platform.to_string(), "x86_64-darwin (10.6.8)");
    assert_eq!(Platform::new(Arch::X86_64, Os::Linux).to_string(), "x86_64-linux");
  }
}
