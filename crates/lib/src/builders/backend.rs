//! Scala backend (sbt).

use super::{BuildContext, BuildError, image, sources};
use crate::component::Component;
use crate::consts::WORKSPACE_DIR;
use crate::pipeline::PipelineDescription;

pub const SBT_IMAGE: &str = "sbtscala/scala-sbt:eclipse-temurin-alpine-21.0.7_6_1.11.3_2.13.16";

/// Fat jar produced by `sbt assembly`, relative to the backend root.
pub const ASSEMBLY_JAR: &str = "target/scala-2.13/backend-assembly-1.0.jar";

/// Interface description written by the OpenAPI generator main class.
pub const OPENAPI_JSON: &str = "openapi.json";

pub const OPENAPI_MAIN: &str = "co.mycelium.OpenApiGenerator";

const WORKDIR: &str = "/workspace/backend";

/// The sbt container with caches and the backend sources, ready for a command.
pub fn container(ctx: &BuildContext<'_>, name: &str) -> Result<PipelineDescription, BuildError> {
  let subset = ctx.subset(&sources::backend())?;
  let sbt = ctx.volume(Component::Backend, "backend-sbt-cache")?;
  let ivy = ctx.volume(Component::Backend, "backend-ivy2-deps")?;
  let coursier = ctx.volume(Component::Backend, "backend-coursier-resolution")?;

  Ok(
    PipelineDescription::from_image(name, image(SBT_IMAGE)?)
      .with_mounted_cache("/root/.sbt", &sbt)
      .with_mounted_cache("/root/.ivy2", &ivy)
      .with_mounted_cache("/root/.cache/coursier", &coursier)
      .with_directory(WORKSPACE_DIR, subset)
      .with_workdir(WORKDIR),
  )
}

pub fn build(ctx: &BuildContext<'_>) -> Result<PipelineDescription, BuildError> {
  Ok(container(ctx, "build-backend")?.with_exec(["sbt", "compile"]))
}

pub fn test(ctx: &BuildContext<'_>) -> Result<PipelineDescription, BuildError> {
  Ok(container(ctx, "test-backend")?.with_exec(["sbt", "test"]))
}

/// Platform-independent fat jar; extract [`ASSEMBLY_JAR`] from it.
pub fn assembly(ctx: &BuildContext<'_>) -> Result<PipelineDescription, BuildError> {
  Ok(container(ctx, "backend-assembly")?.with_exec(["sbt", "assembly"]))
}

/// Writes [`OPENAPI_JSON`] into the backend root.
pub fn openapi(ctx: &BuildContext<'_>) -> Result<PipelineDescription, BuildError> {
  Ok(container(ctx, "backend-openapi")?.with_exec(["sbt".to_string(), format!("runMain {}", OPENAPI_MAIN)]))
}
