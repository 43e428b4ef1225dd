//! Value types that make up a pipeline description.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheVolumeId;
use crate::source::SourceSubset;
use crate::util::hash::ContentHash;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefError {
  #[error("invalid image reference '{0}'")]
  Image(String),

  #[error("invalid secret reference '{0}' (expected env:<NAME> or file:<PATH>)")]
  Secret(String),
}

/// A container image reference (e.g. "rust:1.88-bookworm").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
  pub fn parse(reference: &str) -> Result<Self, RefError> {
    if reference.is_empty() || reference.chars().any(char::is_whitespace) {
      return Err(RefError::Image(reference.to_string()));
    }
    Ok(Self(reference.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ImageRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Opaque handle to a credential.
///
/// Only the reference travels through descriptions and logs; the value is
/// read by the execution engine at the moment it is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SecretRef {
  /// Value held in an environment variable of the orchestrator process
  Env(String),
  /// Value held in a file on the orchestrator host
  File(PathBuf),
}

impl FromStr for SecretRef {
  type Err = RefError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.split_once(':') {
      Some(("env", name)) if !name.is_empty() && !name.contains(char::is_whitespace) => {
        Ok(Self::Env(name.to_string()))
      }
      Some(("file", path)) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
      _ => Err(RefError::Secret(s.to_string())),
    }
  }
}

impl TryFrom<String> for SecretRef {
  type Error = RefError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<SecretRef> for String {
  fn from(secret: SecretRef) -> Self {
    secret.to_string()
  }
}

impl fmt::Display for SecretRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Env(name) => write!(f, "env:{}", name),
      Self::File(path) => write!(f, "file:{}", path.display()),
    }
  }
}

/// A system package pinned to an exact version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PinnedPackage {
  pub name: String,
  pub version: String,
}

impl PinnedPackage {
  pub fn new(name: &str, version: &str) -> Self {
    Self {
      name: name.to_string(),
      version: version.to_string(),
    }
  }

  /// `name=version`, the apt pin syntax.
  pub fn spec(&self) -> String {
    format!("{}={}", self.name, self.version)
  }
}

/// Reference to a file produced by an earlier evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
  pub name: String,
  pub digest: ContentHash,
}

/// One container state transition. Order matters: every step sees the
/// filesystem and environment left by the steps before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transition {
  InstallPackages { packages: Vec<PinnedPackage> },
  MountCache { path: String, volume: CacheVolumeId },
  MountDirectory { path: String, subset: SourceSubset },
  SetWorkdir { path: String },
  SetEnv { key: String, value: String },
  SetSecret { key: String, secret: SecretRef },
  Exec { argv: Vec<String> },
  WithFile { path: String, artifact: ArtifactRef },
  Entrypoint { argv: Vec<String> },
}

impl Transition {
  /// One-line rendering safe for logs: secrets appear by reference only.
  pub fn describe(&self) -> String {
    match self {
      Self::InstallPackages { packages } => {
        let specs: Vec<String> = packages.iter().map(PinnedPackage::spec).collect();
        format!("install {}", specs.join(" "))
      }
      Self::MountCache { path, volume } => format!("cache {} -> {}", volume, path),
      Self::MountDirectory { path, subset } => {
        format!("mount {} files ({}) -> {}", subset.len(), subset.digest().short(), path)
      }
      Self::SetWorkdir { path } => format!("workdir {}", path),
      Self::SetEnv { key, value } => format!("env {}={}", key, value),
      Self::SetSecret { key, secret } => format!("secret {}=<{}>", key, secret),
      Self::Exec { argv } => format!("exec {}", argv.join(" ")),
      Self::WithFile { path, artifact } => format!("file {} ({}) -> {}", artifact.name, artifact.digest.short(), path),
      Self::Entrypoint { argv } => format!("entrypoint {}", argv.join(" ")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn image_ref_rejects_blank_and_whitespace() {
    assert!(ImageRef::parse("rust:1.88-bookworm").is_ok());
    assert_eq!(ImageRef::parse(""), Err(RefError::Image(String::new())));
    assert!(ImageRef::parse("rust 1.88").is_err());
  }

  #[test]
  fn secret_ref_parses_env_and_file() {
    assert_eq!(
      "env:DOCKER_TOKEN".parse::<SecretRef>().unwrap(),
      SecretRef::Env("DOCKER_TOKEN".to_string())
    );
    assert_eq!(
      "file:/run/secrets/registry".parse::<SecretRef>().unwrap(),
      SecretRef::File(PathBuf::from("/run/secrets/registry"))
    );
  }

  #[test]
  fn secret_ref_rejects_plaintext() {
    for raw in ["hunter2", "env:", "vault:path", "file:"] {
      assert!(raw.parse::<SecretRef>().is_err(), "{raw} should be rejected");
    }
  }

  #[test]
  fn secret_transition_describes_reference_only() {
    let step = Transition::SetSecret {
      key: "REGISTRY_TOKEN".to_string(),
      secret: SecretRef::Env("CI_TOKEN".to_string()),
    };
    assert_eq!(step.describe(), "secret REGISTRY_TOKEN=<env:CI_TOKEN>");
  }

  #[test]
  fn pinned_package_spec() {
    assert_eq!(PinnedPackage::new("dbus", "1.14.10-1~deb12u1").spec(), "dbus=1.14.10-1~deb12u1");
  }
}
