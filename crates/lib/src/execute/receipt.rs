//! Install receipts.
//!
//! After a formula's procedure succeeds, a receipt is written into its
//! install prefix recording what was built and a hash of what was installed.
//! A later run that finds a receipt with a matching configuration and an
//! intact tree reuses the install instead of rebuilding.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::consts::INSTALL_RECEIPT;
use crate::formula::Toggle;
use crate::options::SourceVariant;
use crate::plan::PlanEntry;
use crate::util::hash::{ContentHash, DirHashError, HashError, Hashable, ObjectHash, hash_directory};

/// Files excluded when hashing an install tree.
const RECEIPT_HASH_EXCLUSIONS: &[&str] = &[INSTALL_RECEIPT];

const RECEIPT_FORMAT: u32 = 1;

#[derive(Debug, Error)]
pub enum ReceiptError {
  #[error("failed to hash formula: {0}")]
  Hash(#[from] HashError),

  #[error("failed to hash install tree: {0}")]
  Tree(#[from] DirHashError),

  #[error("failed to access {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed receipt {path}: {message}")]
  Malformed { path: PathBuf, message: String },
}

/// What was installed into a prefix, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
  pub format: u32,
  pub name: String,
  pub version: String,
  pub source: SourceVariant,
  pub formula_hash: ObjectHash,
  pub config_hash: ObjectHash,
  pub options: BTreeMap<String, Toggle>,
  pub dependencies: Vec<String>,
  /// Hash of the installed tree, excluding the receipt itself.
  pub content_hash: ContentHash,
}

impl InstallReceipt {
  pub fn for_entry(entry: &PlanEntry<'_>, prefix: &Path) -> Result<Self, ReceiptError> {
    Ok(Self {
      format: RECEIPT_FORMAT,
      name: entry.descriptor.name.clone(),
      version: entry.descriptor.version.clone(),
      source: entry.config.source(),
      formula_hash: entry.descriptor.compute_hash()?,
      config_hash: entry.config.compute_hash()?,
      options: entry.config.iter().map(|(name, value)| (name.to_string(), value.toggle)).collect(),
      dependencies: entry.dependencies.clone(),
      content_hash: hash_directory(prefix, RECEIPT_HASH_EXCLUSIONS)?,
    })
  }

  /// True if this receipt was written for the same descriptor and config.
  pub fn matches(&self, entry: &PlanEntry<'_>) -> Result<bool, ReceiptError> {
    Ok(
      self.format == RECEIPT_FORMAT
        && self.formula_hash == entry.descriptor.compute_hash()?
        && self.config_hash == entry.config.compute_hash()?,
    )
  }
}

/// Hash `prefix` and write its receipt.
pub async fn write_receipt(entry: &PlanEntry<'_>, prefix: &Path) -> Result<InstallReceipt, ReceiptError> {
  let receipt = InstallReceipt::for_entry(entry, prefix)?;
  let path = prefix.join(INSTALL_RECEIPT);
  let content = serde_json::to_string_pretty(&receipt).map_err(|e| ReceiptError::Malformed {
    path: path.clone(),
    message: e.to_string(),
  })?;
  fs::write(&path, format!("{}\n", content))
    .await
    .map_err(|source| ReceiptError::Io { path, source })?;
  Ok(receipt)
}

/// Read the receipt in `prefix`, if there is one.
pub fn read_receipt(prefix: &Path) -> Result<Option<InstallReceipt>, ReceiptError> {
  let path = prefix.join(INSTALL_RECEIPT);
  if !path.exists() {
    return Ok(None);
  }

  let content = std::fs::read_to_string(&path).map_err(|source| ReceiptError::Io {
    path: path.clone(),
    source,
  })?;
  serde_json::from_str(&content)
    .map(Some)
    .map_err(|e| ReceiptError::Malformed {
      path,
      message: e.to_string(),
    })
}

/// Check that the tree under `prefix` still hashes to what the receipt says.
pub fn verify_install(prefix: &Path, receipt: &InstallReceipt) -> bool {
  match hash_directory(prefix, RECEIPT_HASH_EXCLUSIONS) {
    Ok(current) if current == receipt.content_hash => true,
    Ok(current) => {
      warn!(
        path = ?prefix,
        expected = %receipt.content_hash,
        actual = %current,
        "install tree changed since it was built"
      );
      false
    }
    Err(e) => {
      debug!(path = ?prefix, error = %e, "failed to hash install tree");
      false
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::build_graph;
  use crate::options::Flags;
  use crate::plan::plan;
  use crate::util::testutil::{linux, registry};
  use tempfile::TempDir;

  #[tokio::test]
  async fn write_then_read_and_verify() {
    let registry = registry(&[("zlib", &[])]);
    let graph = build_graph(&registry, linux(), "zlib", &Flags::new()).unwrap();
    let plan = plan(&graph).unwrap();
    let entry = &plan.entries()[0];

    let prefix = TempDir::new().unwrap();
    std::fs::create_dir_all(prefix.path().join("lib")).unwrap();
    std::fs::write(prefix.path().join("lib/libz.a"), b"archive").unwrap();

    let written = write_receipt(entry, prefix.path()).await.unwrap();
    let read = read_receipt(prefix.path()).unwrap().unwrap();
    assert_eq!(written, read);
    assert!(read.matches(entry).unwrap());
    assert!(verify_install(prefix.path(), &read));

    std::fs::write(prefix.path().join("lib/libz.a"), b"tampered").unwrap();
    assert!(!verify_install(prefix.path(), &read));
  }

  #[test]
  fn missing_receipt_is_none() {
    let prefix = TempDir::new().unwrap();
    assert!(read_receipt(prefix.path()).unwrap().is_none());
  }

  #[test]
  fn garbage_receipt_is_malformed() {
    let prefix = TempDir::new().unwrap();
    std::fs::write(prefix.path().join(INSTALL_RECEIPT), "{").unwrap();
    assert!(matches!(
      read_receipt(prefix.path()),
      Err(ReceiptError::Malformed { .. })
    ));
  }
}
