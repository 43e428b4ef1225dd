//! Multi-architecture publishing of the backend.
//!
//! The backend is compiled once into a portable jar. Each requested platform
//! then runs its own native-image pipeline against that one jar, and the
//! per-platform runtime images are published under a single multi-arch tag.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::builders::{BuildContext, BuildError, backend, native};
use crate::consts::{DEFAULT_IMAGE_NAME, DEFAULT_IMAGE_TAG, DEFAULT_REGISTRY_NAMESPACE};
use crate::engine::{Engine, EngineError, PublishRequest};
use crate::pipeline::{ArtifactRef, ContainerImage, SecretRef};
use crate::platform::Platform;

#[derive(Debug, Error)]
pub enum PublishError {
  #[error(transparent)]
  Build(#[from] BuildError),

  #[error("registry authentication failed for {registry}: {message}")]
  Auth { registry: String, message: String },

  #[error("multi-arch manifest assembly failed: {message}")]
  Manifest { message: String },

  #[error("invalid platform set: {reason}")]
  InvalidPlatforms { reason: String },

  #[error("invalid image address '{address}': {reason}")]
  InvalidAddress { address: String, reason: &'static str },

  #[error("{stage} failed: {source}")]
  Engine {
    stage: String,
    #[source]
    source: EngineError,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
  pub namespace: String,
  pub image: String,
  /// Defaults to `latest`
  pub tag: Option<String>,
  pub platforms: Vec<Platform>,
  pub username: String,
  pub credential: SecretRef,
}

impl PublishOptions {
  pub fn new(credential: SecretRef) -> Self {
    Self {
      namespace: DEFAULT_REGISTRY_NAMESPACE.to_string(),
      image: DEFAULT_IMAGE_NAME.to_string(),
      tag: None,
      platforms: Platform::ALL.to_vec(),
      username: DEFAULT_REGISTRY_NAMESPACE.to_string(),
      credential,
    }
  }

  pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
    self.tag = Some(tag.into());
    self
  }

  pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
    self.platforms = platforms;
    self
  }

  /// `<namespace>/<image>:<tag>`
  pub fn address(&self) -> String {
    format!(
      "{}/{}:{}",
      self.namespace,
      self.image,
      self.tag.as_deref().unwrap_or(DEFAULT_IMAGE_TAG)
    )
  }

  fn validate(&self) -> Result<(), PublishError> {
    if self.platforms.is_empty() {
      return Err(PublishError::InvalidPlatforms {
        reason: "no target platforms requested".to_string(),
      });
    }
    let unique: BTreeSet<Platform> = self.platforms.iter().copied().collect();
    if unique.len() != self.platforms.len() {
      return Err(PublishError::InvalidPlatforms {
        reason: "duplicate target platform".to_string(),
      });
    }

    let invalid = |reason| PublishError::InvalidAddress {
      address: self.address(),
      reason,
    };
    let name_ok = |s: &str| {
      !s.is_empty()
        && s
          .chars()
          .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-/:".contains(c))
    };
    if !name_ok(&self.namespace) || !name_ok(&self.image) {
      return Err(invalid("repository names are lowercase alphanumerics and . _ - /"));
    }
    let tag = self.tag.as_deref().unwrap_or(DEFAULT_IMAGE_TAG);
    if tag.is_empty()
      || tag.len() > 128
      || tag.starts_with(['.', '-'])
      || !tag.chars().all(|c| c.is_ascii_alphanumeric() || "._-".contains(c))
    {
      return Err(invalid("tags are up to 128 of [A-Za-z0-9_.-], not starting with . or -"));
    }
    Ok(())
  }
}

/// What a publish produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
  pub address: String,
  pub jar: ArtifactRef,
  pub images: Vec<ContainerImage>,
}

fn stage_err(stage: impl Into<String>) -> impl FnOnce(EngineError) -> PublishError {
  let stage = stage.into();
  move |source| PublishError::Engine { stage, source }
}

/// Compile once, fan out per platform, publish one multi-arch image.
pub async fn publish_backend(
  engine: Arc<dyn Engine>,
  ctx: &BuildContext<'_>,
  options: &PublishOptions,
) -> Result<PublishReceipt, PublishError> {
  options.validate()?;
  let address = options.address();
  info!(address = %address, platforms = options.platforms.len(), "publishing backend");

  let assembly = backend::assembly(ctx)?;
  let jar = engine
    .file(assembly, backend::ASSEMBLY_JAR)
    .await
    .map_err(stage_err("backend assembly"))?
    .reference();
  info!(jar = %jar.digest.short(), "assembled backend jar");

  // Describe every platform before anything is spawned.
  let mut compiles = Vec::with_capacity(options.platforms.len());
  for platform in &options.platforms {
    compiles.push((*platform, native::compile(ctx, *platform, &jar)?));
  }

  let mut join_set = JoinSet::new();
  for (platform, compile) in compiles {
    let engine = engine.clone();
    join_set.spawn(async move {
      let binary = engine
        .file(compile, &native::binary_path())
        .await
        .map_err(stage_err(format!("native image for {}", platform)))?;
      let runtime = native::runtime_image(platform, &binary.reference())?;
      let image = engine
        .image(runtime)
        .await
        .map_err(stage_err(format!("runtime image for {}", platform)))?;
      info!(platform = %platform, locator = %image.locator, "built platform image");
      Ok::<_, PublishError>(image)
    });
  }

  let mut images = Vec::new();
  let mut first_error = None;
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok(Ok(image)) => images.push(image),
      Ok(Err(e)) => {
        error!(error = %e, "platform build failed");
        first_error.get_or_insert(e);
      }
      Err(e) => {
        error!(error = %e, "platform task panicked");
        first_error.get_or_insert(PublishError::Engine {
          stage: "platform build".to_string(),
          source: EngineError::Io(std::io::Error::other(e)),
        });
      }
    }
  }
  if let Some(e) = first_error {
    return Err(e);
  }
  images.sort_by_key(|image| image.platform);

  let request = PublishRequest {
    address: address.clone(),
    username: options.username.clone(),
    credential: options.credential.clone(),
    images: images.clone(),
  };
  let published = engine.publish(request).await.map_err(|e| match e {
    EngineError::Auth { registry, message } => PublishError::Auth { registry, message },
    EngineError::Registry { message } => PublishError::Manifest { message },
    other => PublishError::Engine {
      stage: "publish".to_string(),
      source: other,
    },
  })?;
  info!(address = %published, "published backend");

  Ok(PublishReceipt {
    address: published,
    jar,
    images,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::VolumeRegistry;
  use crate::engine::FakeEngine;
  use crate::source::SourceTree;
  use crate::util::testutil::monorepo;

  fn options() -> PublishOptions {
    PublishOptions::new(SecretRef::Env("DOCKER_TOKEN".to_string()))
  }

  #[test]
  fn address_defaults_to_latest() {
    assert_eq!(options().address(), "mycelium/mycelium-backend:latest");
    assert_eq!(options().with_tag("v2").address(), "mycelium/mycelium-backend:v2");
  }

  #[test]
  fn rejects_empty_and_duplicate_platforms() {
    assert!(matches!(
      options().with_platforms(vec![]).validate(),
      Err(PublishError::InvalidPlatforms { .. })
    ));
    assert!(matches!(
      options()
        .with_platforms(vec![Platform::LinuxArm64, Platform::LinuxArm64])
        .validate(),
      Err(PublishError::InvalidPlatforms { .. })
    ));
  }

  #[test]
  fn rejects_bad_tags() {
    assert!(options().with_tag("-v2").validate().is_err());
    assert!(options().with_tag("v 2").validate().is_err());
    assert!(options().with_tag("v2.0.1_rc-1").validate().is_ok());
  }

  #[tokio::test]
  async fn auth_failure_is_a_publish_auth_error() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new().rejecting_auth());

    let err = publish_backend(engine.clone(), &BuildContext::new(&tree, &volumes), &options())
      .await
      .unwrap_err();
    assert!(matches!(err, PublishError::Auth { .. }));
  }

  #[tokio::test]
  async fn failed_native_build_publishes_nothing() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new().failing("native-image-arm64"));

    let err = publish_backend(engine.clone(), &BuildContext::new(&tree, &volumes), &options())
      .await
      .unwrap_err();
    assert!(matches!(err, PublishError::Engine { .. }));
    assert!(engine.publishes().is_empty());
  }

  #[tokio::test]
  async fn credential_travels_by_reference() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new());

    let receipt = publish_backend(engine.clone(), &BuildContext::new(&tree, &volumes), &options())
      .await
      .unwrap();

    let publishes = engine.publishes();
    assert_eq!(publishes.len(), 1);
    assert_eq!(publishes[0].credential, SecretRef::Env("DOCKER_TOKEN".to_string()));
    assert_eq!(receipt.images.len(), 2);
    assert_eq!(receipt.address, "mycelium/mycelium-backend:latest");
  }
}
