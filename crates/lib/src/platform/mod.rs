pub mod arch;
pub mod paths;

use std::fmt;
use std::str::FromStr;

use arch::Arch;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
  #[error("unsupported platform '{given}' (supported: {supported})")]
  Unsupported { given: String, supported: String },
}

/// Container platform a pipeline runs on (e.g. "linux/arm64").
///
/// A pipeline's platform is chosen when the pipeline is created; building for
/// several platforms means building several independent pipelines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Platform {
  #[default]
  LinuxAmd64,
  LinuxArm64,
}

impl Platform {
  /// Every platform the orchestrator knows how to build for
  pub const ALL: [Platform; 2] = [Platform::LinuxAmd64, Platform::LinuxArm64];

  pub fn arch(&self) -> Arch {
    match self {
      Self::LinuxAmd64 => Arch::Amd64,
      Self::LinuxArm64 => Arch::Arm64,
    }
  }

  /// Returns the OCI platform string (e.g. "linux/amd64")
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::LinuxAmd64 => "linux/amd64",
      Self::LinuxArm64 => "linux/arm64",
    }
  }

  /// The linux platform matching the host CPU, if supported
  pub fn host() -> Option<Self> {
    match Arch::current()? {
      Arch::Amd64 => Some(Self::LinuxAmd64),
      Arch::Arm64 => Some(Self::LinuxArm64),
    }
  }

  fn supported_list() -> String {
    Self::ALL.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(", ")
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Platform {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|p| p.as_str() == s.trim())
      .ok_or_else(|| PlatformError::Unsupported {
        given: s.to_string(),
        supported: Self::supported_list(),
      })
  }
}

impl TryFrom<String> for Platform {
  type Error = PlatformError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Platform> for String {
  fn from(platform: Platform) -> Self {
    platform.as_str().to_string()
  }
}
