//! Default filesystem locations.
//!
//! Every location can be overridden through an environment variable; the
//! defaults follow XDG conventions on Unix and the per-user profile folders on
//! Windows. No location is hardcoded to a particular vendor layout such as
//! `/usr/local`.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::{APP_NAME, CELLAR_DIR, OPT_DIR};

/// Overrides the install prefix.
pub const PREFIX_ENV: &str = "FORMULARY_PREFIX";

/// Overrides the formula search path (`PATH`-style list of directories).
pub const FORMULAE_ENV: &str = "FORMULARY_FORMULAE";

/// Overrides the directory builds run in.
pub const BUILD_DIR_ENV: &str = "FORMULARY_BUILD_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
  #[error("cannot determine a default location: {0} is not set")]
  MissingEnv(&'static str),
}

fn env_dir(var: &'static str) -> Result<PathBuf, PathError> {
  match std::env::var_os(var) {
    Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
    _ => Err(PathError::MissingEnv(var)),
  }
}

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> Result<PathBuf, PathError> {
  env_dir("USERPROFILE")
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> Result<PathBuf, PathError> {
  env_dir("HOME")
}

#[cfg(windows)]
pub fn config_dir() -> Result<PathBuf, PathError> {
  Ok(env_dir("APPDATA")?.join(APP_NAME))
}

#[cfg(not(windows))]
pub fn config_dir() -> Result<PathBuf, PathError> {
  let config_home = match env_dir("XDG_CONFIG_HOME") {
    Ok(dir) => dir,
    Err(_) => home_dir()?.join(".config"),
  };
  Ok(config_home.join(APP_NAME))
}

#[cfg(windows)]
pub fn data_dir() -> Result<PathBuf, PathError> {
  Ok(env_dir("APPDATA")?.join(APP_NAME))
}

#[cfg(not(windows))]
pub fn data_dir() -> Result<PathBuf, PathError> {
  let data_home = match env_dir("XDG_DATA_HOME") {
    Ok(dir) => dir,
    Err(_) => home_dir()?.join(".local").join("share"),
  };
  Ok(data_home.join(APP_NAME))
}

#[cfg(windows)]
pub fn cache_dir() -> Result<PathBuf, PathError> {
  Ok(env_dir("LOCALAPPDATA")?.join(APP_NAME).join("Cache"))
}

#[cfg(not(windows))]
pub fn cache_dir() -> Result<PathBuf, PathError> {
  let cache_home = match env_dir("XDG_CACHE_HOME") {
    Ok(dir) => dir,
    Err(_) => home_dir()?.join(".cache"),
  };
  Ok(cache_home.join(APP_NAME))
}

/// The install prefix. Formulas are installed into its cellar.
pub fn prefix_dir() -> Result<PathBuf, PathError> {
  env_dir(PREFIX_ENV).or_else(|_| data_dir())
}

/// Directory holding `<name>/<version>` install prefixes.
pub fn cellar_dir(prefix: &Path) -> PathBuf {
  prefix.join(CELLAR_DIR)
}

/// Stable location of an installed formula, independent of its version.
pub fn opt_dir(prefix: &Path, formula: &str) -> PathBuf {
  prefix.join(OPT_DIR).join(formula)
}

/// Root directory under which each formula gets its working directory.
pub fn build_dir() -> Result<PathBuf, PathError> {
  env_dir(BUILD_DIR_ENV).or_else(|_| cache_dir().map(|dir| dir.join("build")))
}

/// Directories searched for formula files, in priority order.
pub fn formula_dirs() -> Result<Vec<PathBuf>, PathError> {
  match std::env::var_os(FORMULAE_ENV) {
    Some(value) if !value.is_empty() => Ok(std::env::split_paths(&value).collect()),
    _ => Ok(vec![config_dir()?.join("formulae")]),
  }
}
