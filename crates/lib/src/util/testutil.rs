//! Test helpers shared across formulary-lib unit tests.

use crate::formula::{DependencyKind, DependencySpec, FormulaDescriptor, Procedure};
use crate::platform::{Arch, Os, Platform};
use crate::registry::Registry;

/// A minimal valid descriptor with no options, dependencies or steps.
pub fn formula(name: &str) -> FormulaDescriptor {
  FormulaDescriptor {
    name: name.to_string(),
    version: "1.0".to_string(),
    description: None,
    homepage: None,
    url: format!("https://example.com/{name}-1.0.tar.gz"),
    head: None,
    sha256: "0".repeat(64),
    options: Vec::new(),
    dependencies: Vec::new(),
    procedure: Procedure::default(),
    caveats: None,
  }
}

/// A descriptor with runtime dependencies on `deps`, in order.
pub fn formula_with_deps(name: &str, deps: &[&str]) -> FormulaDescriptor {
  let mut descriptor = formula(name);
  descriptor.dependencies = deps
    .iter()
    .map(|dep| DependencySpec::new(dep, DependencyKind::Runtime))
    .collect();
  descriptor
}

/// Registry of `name -> [deps]` pairs.
pub fn registry(graph: &[(&str, &[&str])]) -> Registry {
  Registry::from_formulas(graph.iter().map(|(name, deps)| formula_with_deps(name, deps)))
    .expect("test registry should be valid")
}

pub fn linux() -> Platform {
  Platform::new(Arch::X86_64, Os::Linux)
}

pub fn darwin(version: &str) -> Platform {
  Platform::new(Arch::X86_64, Os::MacOs).with_os_version(version.parse().expect("valid version"))
}

/// Returns the shell command and args to execute a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), script.to_string()])
}
