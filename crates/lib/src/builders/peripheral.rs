//! ESP32 peripheral firmware (edge-peripheral).
//!
//! The Xtensa toolchain comes from `espup`. Installing it is guarded so a warm
//! cache turns the install into a no-op, and every later command has to source
//! the environment script espup writes.

use super::{BuildContext, BuildError, CARGO_HOME, RUST_IMAGE, image, packages, sources};
use crate::component::Component;
use crate::consts::WORKSPACE_DIR;
use crate::pipeline::PipelineDescription;
use crate::platform::Platform;

/// Environment activation script written by `espup install`.
pub const EXPORT_SCRIPT: &str = "/root/export-esp.sh";

const WORKDIR: &str = "/workspace/edge-peripheral";
const ESP_TOOLCHAIN_DIR: &str = "/usr/local/rustup/toolchains/esp";

/// The firmware container. `platform` is both the container platform and the
/// host the cross toolchain is installed for, so the home, toolchain and
/// target volumes are kept per architecture. Download caches are shared.
pub fn container(ctx: &BuildContext<'_>, name: &str, platform: Platform) -> Result<PipelineDescription, BuildError> {
  let own = ctx.subset(&sources::peripheral())?;
  let protocol = ctx.subset(&sources::protocol())?;
  let root_home = ctx.arch_volume(Component::Peripheral, "peripheral-root-home", platform)?;
  let registry = ctx.volume(Component::Peripheral, "peripheral-cargo-registry")?;
  let git = ctx.volume(Component::Peripheral, "peripheral-cargo-git")?;
  let toolchain = ctx.arch_volume(Component::Peripheral, "peripheral-espup-toolchain", platform)?;
  let target = ctx.arch_volume(Component::Peripheral, "peripheral-cargo-target", platform)?;

  Ok(
    PipelineDescription::on_platform(name, image(RUST_IMAGE)?, platform)
      .with_packages(&packages::espup())
      .with_mounted_cache("/root", &root_home)
      .with_mounted_cache(&format!("{}/registry", CARGO_HOME), &registry)
      .with_mounted_cache(&format!("{}/git", CARGO_HOME), &git)
      .with_mounted_cache(ESP_TOOLCHAIN_DIR, &toolchain)
      .with_exec(["bash", "-c", "command -v espup >/dev/null || cargo install espup --locked"])
      .with_exec([
        "bash".to_string(),
        "-c".to_string(),
        format!(
          "test -f {script} || espup install --export-file {script}",
          script = EXPORT_SCRIPT
        ),
      ])
      .with_directory(WORKSPACE_DIR, own)
      .with_directory(WORKSPACE_DIR, protocol)
      .with_workdir(WORKDIR)
      .with_mounted_cache(&format!("{}/target", WORKDIR), &target),
  )
}

/// Run `command` with the toolchain environment activated.
pub fn exec_with_env(pipeline: PipelineDescription, command: &str) -> PipelineDescription {
  pipeline.with_exec([
    "bash".to_string(),
    "-c".to_string(),
    format!(". {} && {}", EXPORT_SCRIPT, command),
  ])
}

pub fn build(ctx: &BuildContext<'_>, platform: Platform) -> Result<PipelineDescription, BuildError> {
  Ok(exec_with_env(
    container(ctx, "build-peripheral", platform)?,
    "cargo build --release",
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::VolumeRegistry;
  use crate::pipeline::Transition;
  use crate::source::{ProjectionError, SourceTree};
  use crate::util::testutil::{monorepo, monorepo_without};

  #[test]
  fn commands_after_install_source_the_toolchain_env() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let p = build(&BuildContext::new(&tree, &volumes), Platform::LinuxArm64).unwrap();

    let execs: Vec<Vec<String>> = p.exec_steps().map(|a| a.to_vec()).collect();
    assert_eq!(execs.len(), 3);
    assert!(execs[0][2].contains("cargo install espup --locked"));
    assert!(execs[1][2].starts_with("test -f /root/export-esp.sh ||"));
    assert_eq!(execs[2][2], ". /root/export-esp.sh && cargo build --release");
    assert_eq!(p.platform(), Some(Platform::LinuxArm64));
  }

  #[test]
  fn mounts_five_firmware_caches() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    build(&BuildContext::new(&tree, &volumes), Platform::LinuxAmd64).unwrap();

    let ids: Vec<String> = volumes
      .volumes()
      .iter()
      .map(|v| v.id().as_str().to_string())
      .collect();
    assert_eq!(
      ids,
      vec![
        "peripheral-cargo-git",
        "peripheral-cargo-registry",
        "peripheral-cargo-target-amd64",
        "peripheral-espup-toolchain-amd64",
        "peripheral-root-home-amd64",
      ]
    );
  }

  #[test]
  fn toolchain_volumes_are_per_architecture() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let ctx = BuildContext::new(&tree, &volumes);

    let ids = |p: &PipelineDescription| -> Vec<String> {
      p.steps()
        .iter()
        .filter_map(|s| match s {
          Transition::MountCache { volume, .. } => Some(volume.as_str().to_string()),
          _ => None,
        })
        .collect()
    };
    let amd = ids(&build(&ctx, Platform::LinuxAmd64).unwrap());
    let arm = ids(&build(&ctx, Platform::LinuxArm64).unwrap());

    for id in ["peripheral-root-home", "peripheral-espup-toolchain", "peripheral-cargo-target"] {
      assert!(amd.contains(&format!("{}-amd64", id)));
      assert!(arm.contains(&format!("{}-arm64", id)));
    }
    let shared: Vec<&String> = amd.iter().filter(|id| arm.contains(id)).collect();
    assert_eq!(shared, vec!["peripheral-cargo-registry", "peripheral-cargo-git"]);
  }

  #[test]
  fn missing_protocol_crate_fails_before_anything_runs() {
    let temp = monorepo_without("edge-protocol");
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();

    let err = build(&BuildContext::new(&tree, &volumes), Platform::LinuxArm64).unwrap_err();
    assert!(matches!(
      err,
      BuildError::Projection(ProjectionError::MissingPath { ref path }) if path == "edge-protocol/Cargo.toml"
    ));
  }
}
