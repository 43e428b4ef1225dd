//! Cache volume registry.
//!
//! Cache volumes are persistent, name-addressed storage areas (package
//! registries, compiler outputs) mounted into pipelines. The name is the
//! address: the same id always resolves to the same volume, across pipelines
//! and across invocations.
//!
//! Ids follow `<component>-<toolchain>-<purpose>` and are namespaced by the
//! owning component, so two components can never end up writing divergent
//! dependency sets into one volume.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::component::Component;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
  #[error("invalid cache volume id '{id}': {reason}")]
  InvalidId { id: String, reason: &'static str },

  /// A component tried to use a volume outside its namespace, which would let
  /// two dependency graphs share one cache.
  #[error("cache volume '{id}' must be namespaced with '{component}-'")]
  Namespace { id: String, component: Component },
}

/// Stable name of a persistent cache volume.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheVolumeId(String);

impl CacheVolumeId {
  /// Validate an id of the form `<component>-<toolchain>-<purpose>`.
  pub fn parse(id: &str) -> Result<Self, CacheError> {
    let invalid = |reason| CacheError::InvalidId {
      id: id.to_string(),
      reason,
    };

    if id.is_empty() {
      return Err(invalid("id is empty"));
    }
    if !id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
      return Err(invalid("only lowercase letters, digits and '-' are allowed"));
    }
    let segments: Vec<&str> = id.split('-').collect();
    if segments.iter().any(|s| s.is_empty()) {
      return Err(invalid("empty segment"));
    }
    if segments.len() < 3 {
      return Err(invalid("expected <component>-<toolchain>-<purpose>"));
    }
    Ok(Self(id.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheVolumeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Handle to one volume. Handles are shared: every lookup of an id returns
/// the same `Arc`.
#[derive(Debug, PartialEq, Eq)]
pub struct CacheVolume {
  id: CacheVolumeId,
  owner: Component,
}

impl CacheVolume {
  pub fn id(&self) -> &CacheVolumeId {
    &self.id
  }

  pub fn owner(&self) -> Component {
    self.owner
  }
}

/// Process-wide map from volume id to volume handle.
#[derive(Debug, Default)]
pub struct VolumeRegistry {
  volumes: Mutex<BTreeMap<CacheVolumeId, Arc<CacheVolume>>>,
}

impl VolumeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Resolve `id` for `owner`, registering it on first use.
  ///
  /// Repeated calls return the same handle. A component may only claim ids
  /// carrying its own prefix, so no id is ever shared between components.
  pub fn volume(&self, owner: Component, id: &str) -> Result<Arc<CacheVolume>, CacheError> {
    let id = CacheVolumeId::parse(id)?;
    if !id.as_str().starts_with(&format!("{}-", owner.as_str())) {
      return Err(CacheError::Namespace {
        id: id.0,
        component: owner,
      });
    }

    let mut volumes = self.volumes.lock();
    if let Some(existing) = volumes.get(&id) {
      return Ok(Arc::clone(existing));
    }

    debug!(volume = %id, component = %owner, "registering cache volume");
    let volume = Arc::new(CacheVolume { id: id.clone(), owner });
    volumes.insert(id, Arc::clone(&volume));
    Ok(volume)
  }

  /// Look up an already registered volume.
  pub fn get(&self, id: &str) -> Option<Arc<CacheVolume>> {
    let id = CacheVolumeId::parse(id).ok()?;
    self.volumes.lock().get(&id).cloned()
  }

  /// All registered volumes, sorted by id.
  pub fn volumes(&self) -> Vec<Arc<CacheVolume>> {
    self.volumes.lock().values().cloned().collect()
  }
}
