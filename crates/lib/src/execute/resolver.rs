//! Placeholder resolver for build step materialization.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::placeholder::{DepOutput, PlaceholderError, Resolver, Var};
use crate::platform::paths;

use super::probe::EnvironmentProbe;
use super::receipt::read_receipt;
use super::types::{Artifacts, BuildResult};

/// Resolves placeholders for the steps of one formula.
///
/// Dependencies are looked up among the formulas completed earlier in the
/// same run first, then among installs the probe can find.
pub struct StepResolver<'a, P> {
  pub(crate) name: &'a str,
  pub(crate) version: &'a str,
  pub(crate) prefix: &'a Path,
  pub(crate) workdir: &'a Path,
  /// Materialized option flags, space-joined when embedded in an argument.
  pub(crate) options: &'a [String],
  pub(crate) install_root: &'a Path,
  pub(crate) completed: &'a [BuildResult],
  pub(crate) probe: &'a P,
  pub(crate) compilers: &'a HashMap<String, PathBuf>,
}

fn path_str(path: &Path) -> Cow<'_, str> {
  path.to_string_lossy()
}

fn owned_path(path: PathBuf) -> Cow<'static, str> {
  Cow::Owned(path.to_string_lossy().into_owned())
}

impl<P: EnvironmentProbe> Resolver for StepResolver<'_, P> {
  fn resolve_var(&self, var: Var) -> Result<Cow<'_, str>, PlaceholderError> {
    Ok(match var {
      Var::Prefix => path_str(self.prefix),
      Var::Name => Cow::Borrowed(self.name),
      Var::Version => Cow::Borrowed(self.version),
      Var::Workdir => path_str(self.workdir),
      Var::Options => Cow::Owned(self.options.join(" ")),
    })
  }

  fn resolve_dep(&self, name: &str, output: DepOutput) -> Result<Cow<'_, str>, PlaceholderError> {
    if let Some(result) = self.completed.iter().find(|r| r.name == name) {
      return Ok(match output {
        DepOutput::Prefix => path_str(&result.prefix),
        DepOutput::Opt => owned_path(paths::opt_dir(self.install_root, name)),
        DepOutput::Version => Cow::Borrowed(result.version.as_str()),
        DepOutput::Bin => path_str(&result.artifacts.bin),
        DepOutput::Include => path_str(&result.artifacts.include),
        DepOutput::Lib => path_str(&result.artifacts.lib),
      });
    }

    let installed = self
      .probe
      .installed_prefix(name)
      .ok_or_else(|| PlaceholderError::UnresolvedDep { name: name.to_string() })?;
    let artifacts = Artifacts::for_prefix(&installed);

    Ok(match output {
      DepOutput::Prefix => owned_path(installed),
      DepOutput::Opt => owned_path(paths::opt_dir(self.install_root, name)),
      DepOutput::Version => Cow::Owned(installed_version(&installed).ok_or_else(|| {
        PlaceholderError::UnresolvedDep { name: name.to_string() }
      })?),
      DepOutput::Bin => owned_path(artifacts.bin),
      DepOutput::Include => owned_path(artifacts.include),
      DepOutput::Lib => owned_path(artifacts.lib),
    })
  }

  fn resolve_compiler(&self, language: &str) -> Result<Cow<'_, str>, PlaceholderError> {
    self
      .compilers
      .get(language)
      .map(|path| path_str(path))
      .ok_or_else(|| PlaceholderError::UnresolvedCompiler {
        language: language.to_string(),
        message: "compiler was not probed".to_string(),
      })
  }
}

/// Version of an install found outside the plan: from its receipt, else from
/// the `<name>/<version>` directory it lives in.
fn installed_version(prefix: &Path) -> Option<String> {
  if let Ok(Some(receipt)) = read_receipt(prefix) {
    return Some(receipt.version);
  }
  prefix.file_name().map(|v| v.to_string_lossy().into_owned())
}
