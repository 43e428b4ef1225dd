//! Hashing utilities for cache keys and source digests.
//!
//! This module provides:
//! - `ObjectHash`: a truncated 20-character hash used as a pipeline cache key
//! - `ContentHash`: a full 64-character hash for file and subset digests
//! - `hash_file()` and `hash_bytes()` for content digests

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A structural hash identifying a unique description.
///
/// The hash is a 20-character truncated SHA-256 of the JSON-serialized value.
/// Serialization order follows field declaration order and every map in a
/// hashed value is a `BTreeMap`, so equal values always produce equal hashes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

fn hex(digest: impl std::fmt::LowerHex) -> String {
  format!("{:x}", digest)
}

/// Values whose serialized form identifies them.
pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let mut hasher = Sha256::new();
    serde_json::to_writer(&mut hasher, self)?;
    let mut digest = hex(hasher.finalize());
    digest.truncate(OBJ_HASH_PREFIX_LEN);
    Ok(ObjectHash(digest))
  }
}

/// A full 64-character SHA256 hash for content verification.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// First 12 characters, for log lines and artifact file names.
  pub fn short(&self) -> &str {
    &self.0[..self.0.len().min(12)]
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error while hashing a file on disk.
#[derive(Debug, thiserror::Error)]
#[error("failed to read file {path}: {message}")]
pub struct FileHashError {
  pub path: String,
  pub message: String,
}

/// Digest of a file's contents, streamed from disk.
pub fn hash_file(path: &Path) -> Result<ContentHash, FileHashError> {
  let read_err = |e: io::Error| FileHashError {
    path: path.display().to_string(),
    message: e.to_string(),
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher).map_err(read_err)?;
  Ok(ContentHash(hex(hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex(Sha256::digest(data)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;
  use tempfile::tempdir;

  #[derive(Serialize)]
  struct Sample {
    name: String,
    labels: BTreeMap<String, String>,
  }

  impl Hashable for Sample {}

  #[test]
  fn object_hash_is_truncated_and_stable() {
    let sample = Sample {
      name: "backend".to_string(),
      labels: BTreeMap::from([("a".to_string(), "1".to_string())]),
    };

    let first = sample.compute_hash().unwrap();
    let second = sample.compute_hash().unwrap();

    assert_eq!(first, second);
    assert_eq!(first.0.len(), OBJ_HASH_PREFIX_LEN);
  }

  #[test]
  fn object_hash_ignores_map_insertion_order() {
    let mut left = BTreeMap::new();
    left.insert("x".to_string(), "1".to_string());
    left.insert("y".to_string(), "2".to_string());
    let mut right = BTreeMap::new();
    right.insert("y".to_string(), "2".to_string());
    right.insert("x".to_string(), "1".to_string());

    let a = Sample { name: "n".to_string(), labels: left };
    let b = Sample { name: "n".to_string(), labels: right };

    assert_eq!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
  }

  #[test]
  fn hash_file_matches_hash_bytes() {
    let temp = tempdir().unwrap();
    let file_path = temp.path().join("test.txt");
    fs::write(&file_path, "hello world").unwrap();

    let from_file = hash_file(&file_path).unwrap();
    assert_eq!(from_file, hash_bytes(b"hello world"));
    assert_eq!(from_file.0.len(), 64);
  }

  #[test]
  fn hash_file_reports_missing_path() {
    let temp = tempdir().unwrap();
    let err = hash_file(&temp.path().join("absent")).unwrap_err();
    assert!(err.path.ends_with("absent"));
  }

  #[test]
  fn short_hash_is_prefix() {
    let hash = hash_bytes(b"abc");
    assert_eq!(hash.short().len(), 12);
    assert!(hash.0.starts_with(hash.short()));
  }
}
