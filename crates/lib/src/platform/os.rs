use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Operating system variants a formula can target.
///
/// Serialized with the same identifiers used in platform triples, so a formula
/// writes `os = "darwin"` rather than `"macos"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Os {
  #[serde(rename = "linux")]
  Linux,
  #[serde(rename = "darwin")]
  MacOs,
  #[serde(rename = "windows")]
  Windows,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
      Self::Windows => "windows",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid OS version: '{0}'")]
pub struct OsVersionError(pub String);

/// A dotted operating system version such as `10.7` or `6.1.12`.
///
/// Components missing from the source string are zero, so `10.7` equals
/// `10.7.0`. Trailing non-numeric suffixes on a component (`6.1.0-arch1`)
/// are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OsVersion {
  pub major: u32,
  pub minor: u32,
  pub patch: u32,
}

impl OsVersion {
  pub fn new(major: u32, minor: u32, patch: u32) -> Self {
    Self { major, minor, patch }
  }

  /// Detect the running OS version.
  ///
  /// Returns `None` when the version cannot be determined; conditions that
  /// depend on it then evaluate to false.
  pub fn detect(os: Os) -> Option<Self> {
    let raw = match os {
      Os::MacOs => {
        let output = std::process::Command::new("sw_vers").arg("-productVersion").output().ok()?;
        String::from_utf8_lossy(&output.stdout).trim().to_string()
      }
      Os::Linux => std::fs::read_to_string("/proc/sys/kernel/osrelease").ok()?.trim().to_string(),
      Os::Windows => return None,
    };
    let parsed = raw.parse().ok();
    debug!(os = %os, raw = %raw, parsed = ?parsed, "detected os version");
    parsed
  }
}

impl FromStr for OsVersion {
  type Err = OsVersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = [0u32; 3];
    let mut seen = 0;

    for (slot, component) in parts.iter_mut().zip(s.trim().split('.')) {
      let digits: String = component.chars().take_while(|c| c.is_ascii_digit()).collect();
      if digits.is_empty() {
        break;
      }
      *slot = digits.parse().map_err(|_| OsVersionError(s.to_string()))?;
      seen += 1;
      if digits.len() != component.len() {
        break;
      }
    }

    if seen == 0 {
      return Err(OsVersionError(s.to_string()));
    }

    Ok(Self::new(parts[0], parts[1], parts[2]))
  }
}

impl TryFrom<String> for OsVersion {
  type Error = OsVersionError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<OsVersion> for String {
  fn from(value: OsVersion) -> Self {
    value.to_string()
  }
}

impl fmt::Display for OsVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.patch == 0 {
      write!(f, "{}.{}", self.major, self.minor)
    } else {
      write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
  }
}
