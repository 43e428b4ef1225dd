//! Central daemon (edge-central).
//!
//! The daemon depends on `current-time` and `edge-protocol` by relative path,
//! so all three crates are mounted at their checkout-relative locations.

use super::{BuildContext, BuildError, CARGO_HOME, RUST_IMAGE, image, packages, sources};
use crate::component::Component;
use crate::consts::WORKSPACE_DIR;
use crate::pipeline::PipelineDescription;
use crate::platform::Platform;

const WORKDIR: &str = "/workspace/edge-central";

pub fn container(ctx: &BuildContext<'_>, name: &str, platform: Option<Platform>) -> Result<PipelineDescription, BuildError> {
  let own = ctx.subset(&sources::central())?;
  let current_time = ctx.subset(&sources::current_time())?;
  let protocol = ctx.subset(&sources::protocol())?;
  let registry = ctx.volume(Component::Central, "central-cargo-registry")?;
  let git = ctx.volume(Component::Central, "central-cargo-git")?;
  // An explicit platform may differ from the host default, so it gets its own
  // build outputs.
  let target = match platform {
    Some(platform) => ctx.arch_volume(Component::Central, "central-cargo-target", platform)?,
    None => ctx.volume(Component::Central, "central-cargo-target")?,
  };

  Ok(
    PipelineDescription::new(name, image(RUST_IMAGE)?, platform)
      .with_packages(&packages::dbus())
      .with_mounted_cache(&format!("{}/registry", CARGO_HOME), &registry)
      .with_mounted_cache(&format!("{}/git", CARGO_HOME), &git)
      .with_directory(WORKSPACE_DIR, own)
      .with_directory(WORKSPACE_DIR, current_time)
      .with_directory(WORKSPACE_DIR, protocol)
      .with_workdir(WORKDIR)
      .with_mounted_cache(&format!("{}/target", WORKDIR), &target),
  )
}

pub fn build(ctx: &BuildContext<'_>, platform: Option<Platform>) -> Result<PipelineDescription, BuildError> {
  Ok(container(ctx, "build-central", platform)?.with_exec(["cargo", "build", "--release"]))
}

pub fn test(ctx: &BuildContext<'_>, platform: Option<Platform>) -> Result<PipelineDescription, BuildError> {
  Ok(container(ctx, "test-central", platform)?.with_exec(["cargo", "test"]))
}
