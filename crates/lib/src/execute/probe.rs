//! Tool and install discovery.
//!
//! Anything the executor needs to know about the host beyond the build plan
//! (where compilers live, which formulas are already installed outside the
//! plan) goes through [`EnvironmentProbe`], so tests can substitute fakes.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::platform::paths;

/// A compiler language a step can ask for with `$${compiler:<lang>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
  C,
  Cxx,
  Fortran,
}

impl Language {
  pub fn as_str(&self) -> &'static str {
    match self {
      Language::C => "c",
      Language::Cxx => "cxx",
      Language::Fortran => "fortran",
    }
  }

  /// Environment variable that overrides the compiler.
  pub fn env_var(&self) -> &'static str {
    match self {
      Language::C => "CC",
      Language::Cxx => "CXX",
      Language::Fortran => "FC",
    }
  }

  /// Programs searched for on `PATH`, in order.
  pub fn candidates(&self) -> &'static [&'static str] {
    match self {
      Language::C => &["cc", "gcc", "clang"],
      Language::Cxx => &["c++", "g++", "clang++"],
      Language::Fortran => &["gfortran"],
    }
  }
}

impl FromStr for Language {
  type Err = ProbeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "c" => Ok(Language::C),
      "cxx" | "c++" => Ok(Language::Cxx),
      "fortran" => Ok(Language::Fortran),
      other => Err(ProbeError::UnknownLanguage(other.to_string())),
    }
  }
}

impl fmt::Display for Language {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
  #[error("unknown compiler language '{0}'")]
  UnknownLanguage(String),

  #[error("no {language} compiler found: set {env} or put one of {} on PATH", candidates.join(", "))]
  CompilerNotFound {
    language: Language,
    env: &'static str,
    candidates: Vec<&'static str>,
  },
}

pub trait EnvironmentProbe {
  fn compiler_path(&self, language: Language) -> Result<PathBuf, ProbeError>;

  /// Prefix of an already-installed formula that is not part of the plan.
  fn installed_prefix(&self, formula: &str) -> Option<PathBuf>;
}

/// Probes the real host.
///
/// The relevant environment (`PATH`, `CC`, `CXX`, `FC`) is captured when the
/// probe is created.
#[derive(Debug, Clone)]
pub struct HostProbe {
  prefix: PathBuf,
  search_path: Option<OsString>,
  cwd: PathBuf,
  overrides: HashMap<Language, OsString>,
}

impl HostProbe {
  pub fn new(prefix: &Path) -> Self {
    let overrides = [Language::C, Language::Cxx, Language::Fortran]
      .into_iter()
      .filter_map(|lang| {
        std::env::var_os(lang.env_var())
          .filter(|v| !v.is_empty())
          .map(|v| (lang, v))
      })
      .collect();

    Self {
      prefix: prefix.to_path_buf(),
      search_path: std::env::var_os("PATH"),
      cwd: std::env::current_dir().unwrap_or_default(),
      overrides,
    }
  }

  fn find_program(&self, program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
      return which::which(program).ok();
    }
    which::which_in(program, self.search_path.as_ref(), &self.cwd).ok()
  }
}

impl EnvironmentProbe for HostProbe {
  fn compiler_path(&self, language: Language) -> Result<PathBuf, ProbeError> {
    let not_found = || ProbeError::CompilerNotFound {
      language,
      env: language.env_var(),
      candidates: language.candidates().to_vec(),
    };

    if let Some(program) = self.overrides.get(&language) {
      debug!(%language, program = ?program, "compiler overridden by environment");
      return self.find_program(Path::new(program)).ok_or_else(not_found);
    }

    language
      .candidates()
      .iter()
      .find_map(|name| self.find_program(Path::new(name)))
      .ok_or_else(not_found)
  }

  fn installed_prefix(&self, formula: &str) -> Option<PathBuf> {
    let opt = paths::opt_dir(&self.prefix, formula);
    if !opt.exists() {
      return None;
    }
    Some(dunce::canonicalize(&opt).unwrap_or(opt))
  }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
  use super::*;
  use serial_test::serial;
  use tempfile::TempDir;

  fn fake_program(dir: &Path, name: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  #[test]
  fn parses_languages() {
    assert_eq!("c++".parse::<Language>().unwrap(), Language::Cxx);
    assert_eq!("fortran".parse::<Language>().unwrap(), Language::Fortran);
    assert_eq!(
      "cobol".parse::<Language>().unwrap_err(),
      ProbeError::UnknownLanguage("cobol".into())
    );
  }

  #[test]
  #[serial]
  fn finds_compiler_on_path() {
    let bin = TempDir::new().unwrap();
    let gfortran = fake_program(bin.path(), "gfortran");
    std::fs::write(bin.path().join("cc"), "not executable").unwrap();

    temp_env::with_vars(
      [("PATH", Some(bin.path().as_os_str())), ("FC", None), ("CC", None)],
      || {
        let probe = HostProbe::new(Path::new("/nonexistent"));
        assert_eq!(probe.compiler_path(Language::Fortran).unwrap(), gfortran);
        assert!(matches!(
          probe.compiler_path(Language::C),
          Err(ProbeError::CompilerNotFound { env: "CC", .. })
        ));
      },
    );
  }

  #[test]
  #[serial]
  fn environment_override_wins() {
    let bin = TempDir::new().unwrap();
    fake_program(bin.path(), "gfortran");
    let custom = fake_program(bin.path(), "gfortran-14");

    temp_env::with_vars(
      [
        ("PATH", Some(bin.path().as_os_str())),
        ("FC", Some(std::ffi::OsStr::new("gfortran-14"))),
      ],
      || {
        let probe = HostProbe::new(Path::new("/nonexistent"));
        assert_eq!(probe.compiler_path(Language::Fortran).unwrap(), custom);
      },
    );
  }

  #[test]
  #[serial]
  fn absolute_override_must_be_executable() {
    let bin = TempDir::new().unwrap();
    let custom = fake_program(bin.path(), "my-cc");
    let plain = bin.path().join("not-a-compiler");
    std::fs::write(&plain, "text").unwrap();

    temp_env::with_vars([("PATH", None::<&std::ffi::OsStr>), ("CC", Some(custom.as_os_str()))], || {
      let probe = HostProbe::new(Path::new("/nonexistent"));
      assert_eq!(probe.compiler_path(Language::C).unwrap(), custom);
    });
    temp_env::with_vars([("PATH", None::<&std::ffi::OsStr>), ("CC", Some(plain.as_os_str()))], || {
      let probe = HostProbe::new(Path::new("/nonexistent"));
      assert!(probe.compiler_path(Language::C).is_err());
    });
  }

  #[test]
  fn installed_prefix_follows_opt_link() {
    let prefix = TempDir::new().unwrap();
    let keg = prefix.path().join("Cellar/freetype/2.5.5");
    std::fs::create_dir_all(&keg).unwrap();
    std::fs::create_dir_all(prefix.path().join("opt")).unwrap();
    std::os::unix::fs::symlink(&keg, prefix.path().join("opt/freetype")).unwrap();

    let probe = HostProbe::new(prefix.path());
    assert_eq!(
      probe.installed_prefix("freetype").unwrap(),
      dunce::canonicalize(&keg).unwrap()
    );
    assert!(probe.installed_prefix("qt").is_none());
  }
}
