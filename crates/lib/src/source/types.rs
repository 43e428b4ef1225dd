//! Types for source projection.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ignore::IgnoreSet;
use crate::util::hash::{ContentHash, FileHashError, hash_bytes};

/// Errors raised while projecting a source tree.
#[derive(Debug, Error)]
pub enum ProjectionError {
  #[error("source root {path} is not a readable directory")]
  NotADirectory { path: PathBuf },

  #[error("invalid glob pattern '{pattern}': {message}")]
  InvalidPattern { pattern: String, message: String },

  #[error("pattern '{pattern}' matched no files")]
  NoMatch { pattern: String },

  #[error("required path '{path}' is missing from the source tree")]
  MissingPath { path: String },

  #[error("failed to walk source tree: {message}")]
  Walk { message: String },

  #[error(transparent)]
  Hash(#[from] FileHashError),

  #[error("failed to materialize {path}: {source}")]
  Materialize {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// The full checkout, before any per-component projection.
#[derive(Debug, Clone)]
pub struct SourceTree {
  root: PathBuf,
  ignore: IgnoreSet,
}

impl SourceTree {
  /// Open a checkout rooted at `root` with the default ignore set.
  pub fn new(root: impl AsRef<Path>) -> Result<Self, ProjectionError> {
    let root = root.as_ref();
    let canonical = dunce::canonicalize(root).map_err(|_| ProjectionError::NotADirectory {
      path: root.to_path_buf(),
    })?;
    if !canonical.is_dir() {
      return Err(ProjectionError::NotADirectory { path: canonical });
    }
    Ok(Self {
      root: canonical,
      ignore: IgnoreSet::default(),
    })
  }

  pub fn with_ignore(mut self, ignore: IgnoreSet) -> Self {
    self.ignore = ignore;
    self
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn ignore(&self) -> &IgnoreSet {
    &self.ignore
  }
}

/// A component's allow-list over the tree.
///
/// `include` globs select what the component sees; every include must match
/// at least one file. `required` paths (files or directories) must exist in
/// the projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGlobs {
  pub include: Vec<String>,
  pub required: Vec<String>,
}

impl SourceGlobs {
  pub fn new<I, S>(include: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      include: include.into_iter().map(Into::into).collect(),
      required: Vec::new(),
    }
  }

  pub fn with_required<I, S>(mut self, required: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.required.extend(required.into_iter().map(Into::into));
    self
  }
}

/// One projected path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceEntry {
  File { digest: ContentHash, executable: bool },
  Symlink { target: String },
}

/// The part of a checkout visible to one component.
///
/// Entries are keyed by `/`-separated path relative to the tree root. The
/// host root is kept for materialization only: it is neither serialized nor
/// compared, so the same content checked out elsewhere yields an equal subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSubset {
  #[serde(skip)]
  pub(crate) root: PathBuf,
  pub(crate) globs: SourceGlobs,
  pub(crate) entries: BTreeMap<String, SourceEntry>,
}

impl PartialEq for SourceSubset {
  fn eq(&self, other: &Self) -> bool {
    self.globs == other.globs && self.entries == other.entries
  }
}

impl Eq for SourceSubset {}

impl SourceSubset {
  pub fn globs(&self) -> &SourceGlobs {
    &self.globs
  }

  pub fn entries(&self) -> &BTreeMap<String, SourceEntry> {
    &self.entries
  }

  pub fn paths(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn contains(&self, path: &str) -> bool {
    self.entries.contains_key(path)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Deterministic digest over the sorted entries.
  pub fn digest(&self) -> ContentHash {
    let mut buf = String::new();
    for (path, entry) in &self.entries {
      match entry {
        SourceEntry::File { digest, executable } => {
          buf.push_str(&format!("F:{}:{}:{}\n", path, digest, u8::from(*executable)));
        }
        SourceEntry::Symlink { target } => {
          buf.push_str(&format!("L:{}:{}\n", path, target));
        }
      }
    }
    hash_bytes(buf.as_bytes())
  }

  /// Copy the projected files into `dest`, preserving relative layout.
  pub fn materialize(&self, dest: &Path) -> Result<(), ProjectionError> {
    for (path, entry) in &self.entries {
      let target = dest.join(path);
      if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ProjectionError::Materialize {
          path: parent.to_path_buf(),
          source,
        })?;
      }

      match entry {
        SourceEntry::File { .. } => {
          std::fs::copy(self.root.join(path), &target).map_err(|source| ProjectionError::Materialize {
            path: target.clone(),
            source,
          })?;
        }
        SourceEntry::Symlink { target: link } => {
          create_symlink(Path::new(link), &target).map_err(|source| ProjectionError::Materialize {
            path: target.clone(),
            source,
          })?;
        }
      }
    }
    Ok(())
  }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
  std::os::windows::fs::symlink_file(target, link)
}
