//! Native backend images for the publish path.
//!
//! The assembly jar is compiled ahead of time with GraalVM `native-image` on
//! the target platform, then the binary alone is placed in a distroless
//! runtime image.

use super::{BuildContext, BuildError, image, sources};
use crate::component::Component;
use crate::pipeline::{ArtifactRef, PipelineDescription};
use crate::platform::Platform;

pub const GRAALVM_IMAGE: &str = "ghcr.io/graalvm/native-image-community:21.0.2";
pub const RUNTIME_IMAGE: &str = "gcr.io/distroless/base-debian12:nonroot";

const BUILD_DIR: &str = "/build";
const BINARY_NAME: &str = "mycelium-backend";

/// Path of the compiled binary inside the native-image pipeline.
pub fn binary_path() -> String {
  format!("{}/{}", BUILD_DIR, BINARY_NAME)
}

/// Compile `jar` for `platform`. Extract [`binary_path`] from the result.
pub fn compile(ctx: &BuildContext<'_>, platform: Platform, jar: &ArtifactRef) -> Result<PipelineDescription, BuildError> {
  let config = ctx.subset(&sources::backend_native())?;
  let cache = ctx.volume(Component::Backend, "backend-graalvm-cache")?;

  Ok(
    PipelineDescription::on_platform(
      format!("native-image-{}", platform.arch()),
      image(GRAALVM_IMAGE)?,
      platform,
    )
    .with_mounted_cache("/root/.native-image", &cache)
    .with_directory(BUILD_DIR, config)
    .with_file(&format!("{}/backend.jar", BUILD_DIR), jar.clone())
    .with_workdir(BUILD_DIR)
    .with_exec([
      "native-image",
      "--no-fallback",
      "-H:ReflectionConfigurationFiles=backend/native-image/reflect-config.json",
      "-jar",
      "backend.jar",
      "-o",
      BINARY_NAME,
    ]),
  )
}

/// Minimal runtime image running the native `binary`.
pub fn runtime_image(platform: Platform, binary: &ArtifactRef) -> Result<PipelineDescription, BuildError> {
  let dest = format!("/app/{}", BINARY_NAME);
  Ok(
    PipelineDescription::on_platform(
      format!("runtime-image-{}", platform.arch()),
      image(RUNTIME_IMAGE)?,
      platform,
    )
    .with_file(&dest, binary.clone())
    .with_entrypoint([dest.as_str()]),
  )
}
