//! Pipeline builders, one per component.
//!
//! Builders are synchronous pure functions of the source tree and their
//! parameters: they project source subsets, claim cache volumes and compose
//! transitions, but never evaluate anything. Calling a builder twice on an
//! unchanged tree yields structurally identical descriptions.

pub mod app;
pub mod backend;
pub mod central;
pub mod client;
pub mod native;
pub mod packages;
pub mod peripheral;
pub mod sources;

use std::sync::Arc;

use thiserror::Error;

use crate::cache::{CacheError, CacheVolume, VolumeRegistry};
use crate::component::Component;
use crate::pipeline::{ImageRef, RefError};
use crate::platform::Platform;
use crate::source::{ProjectionError, SourceGlobs, SourceSubset, SourceTree, project};

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Projection(#[from] ProjectionError),

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error(transparent)]
  Ref(#[from] RefError),
}

/// What every builder needs: the checkout and the process-wide volumes.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
  pub tree: &'a SourceTree,
  pub volumes: &'a VolumeRegistry,
}

impl<'a> BuildContext<'a> {
  pub fn new(tree: &'a SourceTree, volumes: &'a VolumeRegistry) -> Self {
    Self { tree, volumes }
  }

  pub(crate) fn subset(&self, globs: &SourceGlobs) -> Result<SourceSubset, BuildError> {
    Ok(project(self.tree, globs)?)
  }

  pub(crate) fn volume(&self, owner: Component, id: &str) -> Result<Arc<CacheVolume>, BuildError> {
    Ok(self.volumes.volume(owner, id)?)
  }

  /// A volume holding native binaries for one architecture, named
  /// `<id>-<arch>`.
  pub(crate) fn arch_volume(&self, owner: Component, id: &str, platform: Platform) -> Result<Arc<CacheVolume>, BuildError> {
    self.volume(owner, &format!("{}-{}", id, platform.arch()))
  }
}

pub(crate) fn image(reference: &str) -> Result<ImageRef, BuildError> {
  Ok(ImageRef::parse(reference)?)
}

/// Base image shared by the Rust components.
pub const RUST_IMAGE: &str = "rust:1.88-bookworm";

/// Cargo home inside the Rust image.
pub(crate) const CARGO_HOME: &str = "/usr/local/cargo";
