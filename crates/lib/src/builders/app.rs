//! Tauri desktop app.
//!
//! Without a platform the app is built natively on the engine's host. Asking
//! for a platform pins the container to linux/amd64, where the cross
//! toolchain lives; any other target is cross-compiled by registering the rust
//! target and pointing the tauri build at it.

use super::{BuildContext, BuildError, CARGO_HOME, RUST_IMAGE, image, packages, sources};
use crate::component::Component;
use crate::consts::WORKSPACE_DIR;
use crate::pipeline::PipelineDescription;
use crate::platform::Platform;

const WORKDIR: &str = "/workspace/app";

/// Platform of the container whenever a target platform is requested.
const CROSS_HOST: Platform = Platform::LinuxAmd64;

pub fn container(ctx: &BuildContext<'_>, name: &str, platform: Option<Platform>) -> Result<PipelineDescription, BuildError> {
  let subset = ctx.subset(&sources::app())?;
  let registry = ctx.volume(Component::App, "app-cargo-registry")?;
  let git = ctx.volume(Component::App, "app-cargo-git")?;
  let npm = ctx.volume(Component::App, "app-npm-cache")?;
  let build_platform = platform.map(|_| CROSS_HOST);
  let target = match build_platform {
    Some(host) => ctx.arch_volume(Component::App, "app-cargo-target", host)?,
    None => ctx.volume(Component::App, "app-cargo-target")?,
  };

  let mut pipeline = PipelineDescription::new(name, image(RUST_IMAGE)?, build_platform)
    .with_packages(&packages::node_repo_prereqs())
    .with_exec([
      "bash".to_string(),
      "-c".to_string(),
      format!("curl -fsSL {} | bash -", packages::NODE_SETUP_URL),
    ])
    .with_packages(&packages::tauri());

  if let Some(cross) = cross_target(platform) {
    pipeline = pipeline
      .with_packages(&packages::arm64_cross())
      .with_env(
        "CARGO_TARGET_AARCH64_UNKNOWN_LINUX_GNU_LINKER",
        "aarch64-linux-gnu-gcc",
      )
      .with_exec(["rustup", "target", "add", cross]);
  }

  Ok(
    pipeline
      .with_mounted_cache(&format!("{}/registry", CARGO_HOME), &registry)
      .with_mounted_cache(&format!("{}/git", CARGO_HOME), &git)
      .with_mounted_cache("/root/.npm", &npm)
      .with_directory(WORKSPACE_DIR, subset)
      .with_workdir(WORKDIR)
      .with_mounted_cache(&format!("{}/src-tauri/target", WORKDIR), &target),
  )
}

/// Rust target triple to cross-compile for, if `platform` differs from
/// [`CROSS_HOST`].
fn cross_target(platform: Option<Platform>) -> Option<&'static str> {
  platform.filter(|p| *p != CROSS_HOST).map(|p| p.arch().rust_target())
}

pub fn build(ctx: &BuildContext<'_>, platform: Option<Platform>) -> Result<PipelineDescription, BuildError> {
  let command = match cross_target(platform) {
    Some(triple) => format!("npm ci && npm run tauri build -- --target {}", triple),
    None => "npm ci && npm run tauri build".to_string(),
  };
  Ok(container(ctx, "build-app", platform)?.with_exec(["bash".to_string(), "-c".to_string(), command]))
}
