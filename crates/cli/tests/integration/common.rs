//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture directory.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Isolated test environment.
///
/// Each test gets its own temporary prefix, build root and XDG directories.
/// Formulas are read from one of the fixture directories.
pub struct TestEnv {
  pub temp: TempDir,
  pub formulae: PathBuf,
}

impl TestEnv {
  /// Environment reading formulas from `tests/fixtures/<fixture>`.
  pub fn with_fixture(fixture: &str) -> Self {
    Self {
      temp: TempDir::new().unwrap(),
      formulae: fixture_path(fixture),
    }
  }

  /// Environment with an empty formula directory of its own.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    let formulae = temp.path().join("formulae");
    std::fs::create_dir_all(&formulae).unwrap();
    Self { temp, formulae }
  }

  /// Write a formula file into this environment's formula directory.
  pub fn write_formula(&self, name: &str, content: &str) {
    std::fs::write(self.formulae.join(format!("{}.toml", name)), content).unwrap();
  }

  fn dir(&self, name: &str) -> PathBuf {
    let p = self.temp.path().join(name);
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Install prefix (isolated per test).
  pub fn prefix_path(&self) -> PathBuf {
    self.dir("prefix")
  }

  /// Root of per-formula working directories.
  pub fn build_path(&self) -> PathBuf {
    self.dir("build")
  }

  /// Get a pre-configured Command for the formulary binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `FORMULARY_FORMULAE`: The fixture formula directory
  /// - `FORMULARY_PREFIX`: Isolated install prefix
  /// - `FORMULARY_BUILD_DIR`: Isolated build root
  /// - `XDG_CONFIG_HOME`, `XDG_DATA_HOME`, `XDG_CACHE_HOME`: Isolated defaults
  pub fn cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("formulary");
    cmd.env("FORMULARY_FORMULAE", &self.formulae);
    cmd.env("FORMULARY_PREFIX", self.prefix_path());
    cmd.env("FORMULARY_BUILD_DIR", self.build_path());
    cmd.env("XDG_CONFIG_HOME", self.dir("config"));
    cmd.env("XDG_DATA_HOME", self.dir("data"));
    cmd.env("XDG_CACHE_HOME", self.dir("cache"));
    cmd.env_remove("RUST_LOG");
    cmd.env("NO_COLOR", "1");
    cmd
  }
}
