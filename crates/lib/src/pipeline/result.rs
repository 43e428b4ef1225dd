//! Terminal artifacts of evaluating a pipeline.
//!
//! A `BuildResult` belongs to whoever requested the evaluation; builders
//! never hold on to one.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::types::ArtifactRef;
use crate::platform::Platform;
use crate::util::hash::{ContentHash, ObjectHash, hash_bytes};

/// A single file extracted from a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
  /// Path of the file inside the container
  pub path: String,
  pub contents: Vec<u8>,
  pub digest: ContentHash,
}

impl FileArtifact {
  pub fn new(path: impl Into<String>, contents: Vec<u8>) -> Self {
    let digest = hash_bytes(&contents);
    Self {
      path: path.into(),
      contents,
      digest,
    }
  }

  /// Base name of the container path.
  pub fn name(&self) -> &str {
    self.path.rsplit('/').next().unwrap_or(&self.path)
  }

  /// Handle later pipelines use to place this file.
  pub fn reference(&self) -> ArtifactRef {
    ArtifactRef {
      name: self.name().to_string(),
      digest: self.digest.clone(),
    }
  }
}

/// A directory exported from a pipeline onto the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryArtifact {
  pub host_path: PathBuf,
  pub files: usize,
}

/// A platform-specific container image produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerImage {
  pub platform: Platform,
  /// Engine-specific locator (image id, archive path, ...)
  pub locator: String,
  /// Cache key of the pipeline the image was built from
  pub pipeline_key: ObjectHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildResult {
  Stdout(String),
  File(FileArtifact),
  Directory(DirectoryArtifact),
  Image(ContainerImage),
}

impl BuildResult {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Stdout(_) => "stdout",
      Self::File(_) => "file",
      Self::Directory(_) => "directory",
      Self::Image(_) => "image",
    }
  }

  pub fn into_stdout(self) -> Option<String> {
    match self {
      Self::Stdout(out) => Some(out),
      _ => None,
    }
  }

  pub fn into_file(self) -> Option<FileArtifact> {
    match self {
      Self::File(file) => Some(file),
      _ => None,
    }
  }

  pub fn into_directory(self) -> Option<DirectoryArtifact> {
    match self {
      Self::Directory(dir) => Some(dir),
      _ => None,
    }
  }

  pub fn into_image(self) -> Option<ContainerImage> {
    match self {
      Self::Image(image) => Some(image),
      _ => None,
    }
  }
}
