//! Hashing utilities for formula fingerprints and install verification.
//!
//! - `ObjectHash`: truncated hash of a serializable value (descriptor, config)
//! - `ContentHash`: full hash of a file or a directory tree

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A 20-character truncated SHA-256 of a value's JSON serialization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_vec(self)?;
    let full = hex::encode(Sha256::digest(&serialized));
    Ok(ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

/// A full 64-character SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum DirHashError {
  #[error("failed to walk directory: {0}")]
  Walk(#[from] walkdir::Error),

  #[error("failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// Returns true if `value` looks like a SHA-256 hex digest.
pub fn is_sha256_hex(value: &str) -> bool {
  value.len() == 64 && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Hash an install tree.
///
/// Regular files contribute their relative path and content hash, directories
/// their relative path, symlinks their target. Entries whose file name is in
/// `exclude` are skipped along with everything beneath them. Timestamps and
/// permissions are ignored.
pub fn hash_directory(path: &Path, exclude: &[&str]) -> Result<ContentHash, DirHashError> {
  let mut hasher = Sha256::new();

  let walker = WalkDir::new(path)
    .min_depth(1)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.file_name().to_str().is_none_or(|name| !exclude.contains(&name)));

  for entry in walker {
    let entry = entry?;
    let rel = entry.path().strip_prefix(path).unwrap_or(entry.path()).to_string_lossy();
    let file_type = entry.file_type();

    let line = if file_type.is_symlink() {
      let target = fs::read_link(entry.path()).map_err(|source| DirHashError::Read {
        path: entry.path().display().to_string(),
        source,
      })?;
      format!("L:{}:{}", rel, target.to_string_lossy())
    } else if file_type.is_dir() {
      format!("D:{}", rel)
    } else if file_type.is_file() {
      format!("F:{}:{}", rel, hash_file(entry.path())?)
    } else {
      continue;
    };

    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_file(path: &Path) -> Result<ContentHash, DirHashError> {
  let read_err = |source| DirHashError::Read {
    path: path.display().to_string(),
    source,
  };
  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let n = file.read(&mut buffer).map_err(read_err)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}
