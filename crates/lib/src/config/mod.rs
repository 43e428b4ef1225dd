//! Orchestrator configuration.
//!
//! Read from TOML. Lookup order: `MYCO_CONFIG`, `myco.toml` at the source
//! root, then `myco.toml` in the user config dir. Every field has a default,
//! so an absent file means the built-in configuration. Platform strings and
//! CI task names are validated while loading.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ci::{CiConfig, CiTask};
use crate::consts::{CONFIG_ENV, CONFIG_FILE_NAME, DEFAULT_IMAGE_NAME, DEFAULT_REGISTRY_NAMESPACE};
use crate::matrix::PublishOptions;
use crate::pipeline::SecretRef;
use crate::platform::Platform;
use crate::platform::paths::{cache_dir, config_dir};
use crate::source::{IgnoreSet, ProjectionError};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {message}")]
  Parse { path: PathBuf, message: String },

  #[error("invalid config value for {field}: {reason}")]
  Invalid { field: &'static str, reason: String },

  #[error(transparent)]
  Ignore(#[from] ProjectionError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MycoConfig {
  /// Checkout root; relative paths resolve against the config file
  pub source_root: Option<PathBuf>,
  /// Extra globs hidden from every component, on top of the built-in set
  pub ignore: Vec<String>,
  pub registry: RegistryConfig,
  pub publish: PublishConfig,
  pub ci: CiSection,
  pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
  pub namespace: String,
  pub image: String,
  /// Registry login; defaults to the namespace
  pub username: Option<String>,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      namespace: DEFAULT_REGISTRY_NAMESPACE.to_string(),
      image: DEFAULT_IMAGE_NAME.to_string(),
      username: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
  pub platforms: Vec<Platform>,
}

impl Default for PublishConfig {
  fn default() -> Self {
    Self {
      platforms: Platform::ALL.to_vec(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CiSection {
  pub tasks: Vec<CiTask>,
  pub platform: Platform,
  pub parallelism: usize,
  pub timeout_secs: Option<u64>,
}

impl Default for CiSection {
  fn default() -> Self {
    let defaults = CiConfig::default();
    Self {
      tasks: defaults.tasks,
      platform: defaults.platform,
      parallelism: defaults.parallelism,
      timeout_secs: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
  pub docker_bin: String,
  /// Build contexts and exported artifacts; defaults to the user cache dir
  pub state_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      docker_bin: "docker".to_string(),
      state_dir: None,
    }
  }
}

impl EngineConfig {
  /// `state_dir`, or `engine/` under the user cache dir.
  pub fn resolved_state_dir(&self) -> PathBuf {
    self.state_dir.clone().unwrap_or_else(|| cache_dir().join("engine"))
  }
}

impl Default for MycoConfig {
  fn default() -> Self {
    Self {
      source_root: None,
      ignore: Vec::new(),
      registry: RegistryConfig::default(),
      publish: PublishConfig::default(),
      ci: CiSection::default(),
      engine: EngineConfig::default(),
    }
  }
}

impl MycoConfig {
  /// Load and validate a config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config = Self::parse(&content).map_err(|e| match e {
      ConfigError::Parse { message, .. } => ConfigError::Parse {
        path: path.to_path_buf(),
        message,
      },
      other => other,
    })?;

    if let Some(root) = &config.source_root
      && root.is_relative()
    {
      let base = path.parent().unwrap_or(Path::new("."));
      config.source_root = Some(base.join(root));
    }
    debug!(path = %path.display(), "loaded config");
    Ok(config)
  }

  /// Parse and validate TOML content.
  pub fn parse(content: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
      path: PathBuf::new(),
      message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
  }

  /// Find the config for a checkout at `source_root`.
  pub fn discover(source_root: &Path) -> Result<Self, ConfigError> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
      return Self::load(Path::new(&path));
    }
    for candidate in [source_root.join(CONFIG_FILE_NAME), config_dir().join(CONFIG_FILE_NAME)] {
      if candidate.is_file() {
        return Self::load(&candidate);
      }
    }
    debug!("no config file found, using defaults");
    Ok(Self::default())
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.ci.tasks.is_empty() {
      return Err(ConfigError::Invalid {
        field: "ci.tasks",
        reason: "at least one task is required".to_string(),
      });
    }
    let mut seen = BTreeSet::new();
    if let Some(task) = self.ci.tasks.iter().find(|t| !seen.insert(**t)) {
      return Err(ConfigError::Invalid {
        field: "ci.tasks",
        reason: format!("'{}' is listed more than once", task),
      });
    }
    if self.ci.parallelism == 0 {
      return Err(ConfigError::Invalid {
        field: "ci.parallelism",
        reason: "must be at least 1".to_string(),
      });
    }
    let unique: BTreeSet<&Platform> = self.publish.platforms.iter().collect();
    if self.publish.platforms.is_empty() || unique.len() != self.publish.platforms.len() {
      return Err(ConfigError::Invalid {
        field: "publish.platforms",
        reason: "must be a non-empty list without duplicates".to_string(),
      });
    }
    self.ignore_set()?;
    Ok(())
  }

  /// The global ignore set: built-in names plus configured globs.
  pub fn ignore_set(&self) -> Result<IgnoreSet, ProjectionError> {
    IgnoreSet::default().with_globs(self.ignore.iter().cloned())
  }

  /// CI configuration, with command-line overrides applied.
  pub fn ci_config(&self, platform: Option<Platform>, timeout: Option<Duration>) -> CiConfig {
    CiConfig {
      tasks: self.ci.tasks.clone(),
      platform: platform.unwrap_or(self.ci.platform),
      parallelism: self.ci.parallelism,
      timeout: timeout.or(self.ci.timeout_secs.map(Duration::from_secs)),
    }
  }

  /// Publish options for `credential`, with command-line overrides applied.
  pub fn publish_options(
    &self,
    credential: SecretRef,
    tag: Option<String>,
    platforms: Option<Vec<Platform>>,
  ) -> PublishOptions {
    PublishOptions {
      namespace: self.registry.namespace.clone(),
      image: self.registry.image.clone(),
      tag,
      platforms: platforms.unwrap_or_else(|| self.publish.platforms.clone()),
      username: self
        .registry
        .username
        .clone()
        .unwrap_or_else(|| self.registry.namespace.clone()),
      credential,
    }
  }
}
