//! The formula registry.
//!
//! A [`Registry`] is built once, either from in-memory descriptors or from
//! directories of `*.toml` formula files, and is read-only afterwards. Every
//! descriptor is validated on the way in so later stages can rely on
//! well-formed options, conditions and step arguments.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::consts::FORMULA_EXTENSION;
use crate::formula::{Condition, FormulaDescriptor};
use crate::placeholder;
use crate::util::hash::is_sha256_hex;

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("no formula named '{0}'")]
  NotFound(String),

  #[error("formula '{name}' is defined more than once")]
  Duplicate { name: String },

  #[error("invalid formula '{name}': {reason}")]
  InvalidFormula { name: String, reason: String },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: Box<toml::de::Error>,
  },

  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Read-only map of formula name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct Registry {
  formulas: BTreeMap<String, FormulaDescriptor>,
}

impl Registry {
  /// Build a registry from descriptors, validating each one.
  ///
  /// # Errors
  ///
  /// `Duplicate` if two descriptors share a name, `InvalidFormula` if any
  /// descriptor fails validation.
  pub fn from_formulas<I>(formulas: I) -> Result<Self, RegistryError>
  where
    I: IntoIterator<Item = FormulaDescriptor>,
  {
    let mut map = BTreeMap::new();
    for formula in formulas {
      validate(&formula)?;
      if map.contains_key(&formula.name) {
        return Err(RegistryError::Duplicate { name: formula.name });
      }
      map.insert(formula.name.clone(), formula);
    }
    Ok(Self { formulas: map })
  }

  /// Load every `*.toml` file beneath `dir`, in file-name order.
  pub fn from_dir(dir: &Path) -> Result<Self, RegistryError> {
    let formulas = read_dir(dir)?;
    Self::from_formulas(formulas)
  }

  /// Load formula directories in priority order.
  ///
  /// A formula in an earlier directory shadows one of the same name in a later
  /// directory. Directories that do not exist are skipped.
  pub fn from_dirs<P: AsRef<Path>>(dirs: &[P]) -> Result<Self, RegistryError> {
    let mut seen = BTreeSet::new();
    let mut formulas = Vec::new();

    for dir in dirs {
      let dir = dir.as_ref();
      if !dir.is_dir() {
        debug!(dir = %dir.display(), "formula directory does not exist, skipping");
        continue;
      }

      let mut local = BTreeSet::new();
      for formula in read_dir(dir)? {
        if !local.insert(formula.name.clone()) {
          return Err(RegistryError::Duplicate { name: formula.name });
        }
        if seen.contains(&formula.name) {
          debug!(formula = %formula.name, dir = %dir.display(), "shadowed by an earlier directory");
          continue;
        }
        seen.insert(formula.name.clone());
        formulas.push(formula);
      }
    }

    let registry = Self::from_formulas(formulas)?;
    info!(count = registry.len(), "loaded formula registry");
    Ok(registry)
  }

  /// Look up a formula by name.
  pub fn load(&self, name: &str) -> Result<&FormulaDescriptor, RegistryError> {
    self
      .formulas
      .get(name)
      .ok_or_else(|| RegistryError::NotFound(name.to_string()))
  }

  pub fn get(&self, name: &str) -> Option<&FormulaDescriptor> {
    self.formulas.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.formulas.contains_key(name)
  }

  /// All descriptors in name order.
  pub fn all(&self) -> impl Iterator<Item = &FormulaDescriptor> {
    self.formulas.values()
  }

  pub fn len(&self) -> usize {
    self.formulas.len()
  }

  pub fn is_empty(&self) -> bool {
    self.formulas.is_empty()
  }
}

/// Parse the text of one formula file. `path` is only used in errors.
pub fn parse_formula(text: &str, path: &Path) -> Result<FormulaDescriptor, RegistryError> {
  toml::from_str(text).map_err(|source| RegistryError::Parse {
    path: path.to_path_buf(),
    source: Box::new(source),
  })
}

fn read_dir(dir: &Path) -> Result<Vec<FormulaDescriptor>, RegistryError> {
  let mut formulas = Vec::new();

  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(|e| RegistryError::Io {
      path: e.path().unwrap_or(dir).to_path_buf(),
      source: e.into(),
    })?;
    let path = entry.path();
    if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != FORMULA_EXTENSION) {
      continue;
    }

    let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let formula = parse_formula(&text, path)?;
    debug!(formula = %formula.name, path = %path.display(), "parsed formula");
    formulas.push(formula);
  }

  Ok(formulas)
}

fn validate(formula: &FormulaDescriptor) -> Result<(), RegistryError> {
  let invalid = |reason: String| RegistryError::InvalidFormula {
    name: formula.name.clone(),
    reason,
  };

  if formula.name.is_empty() {
    return Err(invalid("name is empty".to_string()));
  }
  if formula.version.is_empty() {
    return Err(invalid("version is empty".to_string()));
  }
  if !is_sha256_hex(&formula.sha256) {
    return Err(invalid(format!(
      "sha256 must be 64 lowercase hex characters, got '{}'",
      formula.sha256
    )));
  }

  let mut declared = BTreeSet::new();
  for option in &formula.options {
    if !declared.insert(option.name.as_str()) {
      return Err(invalid(format!("option '{}' is declared twice", option.name)));
    }
  }

  let options = formula.effective_options();
  let mut groups: BTreeMap<&str, usize> = BTreeMap::new();
  for option in &options {
    if let Some(group) = option.group.as_deref() {
      *groups.entry(group).or_default() += usize::from(option.default.is_on());
    }
  }
  for (group, defaults) in groups {
    if defaults != 1 {
      return Err(invalid(format!(
        "exclusive group '{group}' must have exactly one default-on option, found {defaults}"
      )));
    }
  }

  let check_condition = |condition: &Condition| -> Result<(), RegistryError> {
    for option in condition.referenced_options() {
      if !formula.has_option(option) {
        return Err(invalid(format!("condition references unknown option '{option}'")));
      }
    }
    Ok(())
  };

  for dep in &formula.dependencies {
    if dep.name == formula.name {
      return Err(invalid("formula depends on itself".to_string()));
    }
    if let Some(condition) = &dep.when {
      check_condition(condition)?;
    }
    for arg in &dep.args {
      if let Some(condition) = arg.condition() {
        check_condition(condition)?;
      }
    }
  }

  let procedure = &formula.procedure;
  for flag in &procedure.option_flags {
    if !formula.has_option(&flag.option) {
      return Err(invalid(format!("option_flags references unknown option '{}'", flag.option)));
    }
  }

  let check_text = |text: &str| -> Result<(), RegistryError> {
    placeholder::parse(text)
      .map(|_| ())
      .map_err(|e| invalid(format!("bad placeholder in '{text}': {e}")))
  };

  for value in procedure.env.values() {
    check_text(value)?;
  }
  for step in &procedure.steps {
    if let Some(condition) = &step.when {
      check_condition(condition)?;
    }
    check_text(&step.program)?;
    for arg in &step.args {
      if let Some(condition) = arg.condition() {
        check_condition(condition)?;
      }
      check_text(arg.arg())?;
    }
    for value in step.env.values() {
      check_text(value)?;
    }
  }

  Ok(())
}
