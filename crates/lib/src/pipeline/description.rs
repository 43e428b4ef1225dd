//! Immutable pipeline descriptions.

use serde::{Deserialize, Serialize};

use super::types::{ArtifactRef, ImageRef, PinnedPackage, SecretRef, Transition};
use crate::cache::CacheVolume;
use crate::platform::Platform;
use crate::source::SourceSubset;
use crate::util::hash::{HashError, Hashable, ObjectHash};

/// An unevaluated description of container state for one component.
///
/// Building a description never runs anything; it is handed to an
/// [`Engine`](crate::engine::Engine) for evaluation. Every `with_*` method
/// consumes the description and returns the extended one.
///
/// The platform is fixed at construction. To build for several platforms,
/// build several descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDescription {
  name: String,
  base_image: ImageRef,
  platform: Option<Platform>,
  steps: Vec<Transition>,
}

/// The part of a description that determines its cache key. The name is
/// only a label and is not part of the key.
#[derive(Serialize)]
struct CacheKeyView<'a> {
  base_image: &'a ImageRef,
  platform: &'a Option<Platform>,
  steps: &'a [Transition],
}

impl Hashable for CacheKeyView<'_> {}

impl PipelineDescription {
  pub fn new(name: impl Into<String>, base_image: ImageRef, platform: Option<Platform>) -> Self {
    Self {
      name: name.into(),
      base_image,
      platform,
      steps: Vec::new(),
    }
  }

  /// Start from `base_image` on the engine's default platform.
  pub fn from_image(name: impl Into<String>, base_image: ImageRef) -> Self {
    Self::new(name, base_image, None)
  }

  /// Start from `base_image` pinned to `platform`.
  pub fn on_platform(name: impl Into<String>, base_image: ImageRef, platform: Platform) -> Self {
    Self::new(name, base_image, Some(platform))
  }

  fn push(mut self, step: Transition) -> Self {
    self.steps.push(step);
    self
  }

  pub fn with_packages(self, packages: &[PinnedPackage]) -> Self {
    self.push(Transition::InstallPackages {
      packages: packages.to_vec(),
    })
  }

  pub fn with_mounted_cache(self, path: &str, volume: &CacheVolume) -> Self {
    self.push(Transition::MountCache {
      path: path.to_string(),
      volume: volume.id().clone(),
    })
  }

  pub fn with_directory(self, path: &str, subset: SourceSubset) -> Self {
    self.push(Transition::MountDirectory {
      path: path.to_string(),
      subset,
    })
  }

  pub fn with_workdir(self, path: &str) -> Self {
    self.push(Transition::SetWorkdir { path: path.to_string() })
  }

  pub fn with_env(self, key: &str, value: &str) -> Self {
    self.push(Transition::SetEnv {
      key: key.to_string(),
      value: value.to_string(),
    })
  }

  pub fn with_secret(self, key: &str, secret: SecretRef) -> Self {
    self.push(Transition::SetSecret {
      key: key.to_string(),
      secret,
    })
  }

  pub fn with_exec<I, S>(self, argv: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.push(Transition::Exec {
      argv: argv.into_iter().map(Into::into).collect(),
    })
  }

  pub fn with_file(self, path: &str, artifact: ArtifactRef) -> Self {
    self.push(Transition::WithFile {
      path: path.to_string(),
      artifact,
    })
  }

  pub fn with_entrypoint<I, S>(self, argv: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.push(Transition::Entrypoint {
      argv: argv.into_iter().map(Into::into).collect(),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn base_image(&self) -> &ImageRef {
    &self.base_image
  }

  pub fn platform(&self) -> Option<Platform> {
    self.platform
  }

  pub fn steps(&self) -> &[Transition] {
    &self.steps
  }

  /// Argument vectors of every `Exec` step, in order.
  pub fn exec_steps(&self) -> impl Iterator<Item = &[String]> {
    self.steps.iter().filter_map(|step| match step {
      Transition::Exec { argv } => Some(argv.as_slice()),
      _ => None,
    })
  }

  /// Structural cache key: equal transition sequences on the same base image
  /// and platform yield equal keys, whenever they were built.
  pub fn cache_key(&self) -> Result<ObjectHash, HashError> {
    CacheKeyView {
      base_image: &self.base_image,
      platform: &self.platform,
      steps: &self.steps,
    }
    .compute_hash()
  }

  /// Log-safe rendering of every step.
  pub fn redacted_steps(&self) -> Vec<String> {
    self.steps.iter().map(Transition::describe).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::VolumeRegistry;
  use crate::component::Component;

  fn image() -> ImageRef {
    ImageRef::parse("rust:1.88-bookworm").unwrap()
  }

  fn sample(name: &str) -> PipelineDescription {
    let volumes = VolumeRegistry::new();
    let registry = volumes.volume(Component::Central, "central-cargo-registry").unwrap();
    PipelineDescription::from_image(name, image())
      .with_packages(&[PinnedPackage::new("pkg-config", "1.8.1-1")])
      .with_mounted_cache("/root/.cargo/registry", &registry)
      .with_workdir("/workspace/edge-central")
      .with_exec(["cargo", "test"])
  }

  #[test]
  fn identical_descriptions_share_cache_key() {
    assert_eq!(sample("a"), sample("a"));
    assert_eq!(sample("a").cache_key().unwrap(), sample("a").cache_key().unwrap());
  }

  #[test]
  fn name_is_not_part_of_cache_key() {
    assert_ne!(sample("test-central"), sample("renamed"));
    assert_eq!(
      sample("test-central").cache_key().unwrap(),
      sample("renamed").cache_key().unwrap()
    );
  }

  #[test]
  fn step_order_changes_cache_key() {
    let a = PipelineDescription::from_image("p", image())
      .with_exec(["step1"])
      .with_exec(["step2"]);
    let b = PipelineDescription::from_image("p", image())
      .with_exec(["step2"])
      .with_exec(["step1"]);

    assert_ne!(a.cache_key().unwrap(), b.cache_key().unwrap());
  }

  #[test]
  fn platform_changes_cache_key() {
    let amd = PipelineDescription::on_platform("p", image(), Platform::LinuxAmd64).with_exec(["true"]);
    let arm = PipelineDescription::on_platform("p", image(), Platform::LinuxArm64).with_exec(["true"]);

    assert_eq!(amd.platform(), Some(Platform::LinuxAmd64));
    assert_ne!(amd.cache_key().unwrap(), arm.cache_key().unwrap());
  }

  #[test]
  fn extending_leaves_the_original_untouched() {
    let base = sample("base");
    let extended = base.clone().with_exec(["cargo", "build"]);

    assert_eq!(base.steps().len() + 1, extended.steps().len());
    assert_ne!(base.cache_key().unwrap(), extended.cache_key().unwrap());
  }

  #[test]
  fn exec_steps_in_order() {
    let execs: Vec<Vec<String>> = sample("a")
      .with_exec(["cargo", "build"])
      .exec_steps()
      .map(|argv| argv.to_vec())
      .collect();
    assert_eq!(execs, vec![vec!["cargo", "test"], vec!["cargo", "build"]]);
  }

  #[test]
  fn redacted_steps_hide_secret_values() {
    let p = PipelineDescription::from_image("p", image())
      .with_secret("TOKEN", SecretRef::Env("REGISTRY_TOKEN".to_string()))
      .with_exec(["sh", "-c", "echo ok"]);

    let rendered = p.redacted_steps().join("\n");
    assert!(rendered.contains("secret TOKEN=<env:REGISTRY_TOKEN>"));
  }
}
