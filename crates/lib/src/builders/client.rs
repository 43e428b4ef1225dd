//! API client generation from the backend's OpenAPI document.

use super::{BuildError, image};
use crate::pipeline::{ArtifactRef, PipelineDescription};

pub const GENERATOR_IMAGE: &str = "openapitools/openapi-generator-cli:v7.14.0";

/// Directory the generated client is written to inside the container.
pub const OUTPUT_DIR: &str = "/out";

const SPEC_PATH: &str = "/tmp/openapi.json";

/// Run `generator` over the OpenAPI document `spec`.
pub fn generate(spec: &ArtifactRef, generator: &str, package_name: &str) -> Result<PipelineDescription, BuildError> {
  Ok(
    PipelineDescription::from_image("create-client", image(GENERATOR_IMAGE)?)
      .with_file(SPEC_PATH, spec.clone())
      .with_exec(["mkdir", "-p", OUTPUT_DIR])
      .with_exec([
        "/usr/local/bin/docker-entrypoint.sh".to_string(),
        "generate".to_string(),
        "-i".to_string(),
        SPEC_PATH.to_string(),
        "-g".to_string(),
        generator.to_string(),
        "-o".to_string(),
        OUTPUT_DIR.to_string(),
        "--additional-properties".to_string(),
        format!("packageName={}", package_name),
      ]),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::hash::hash_bytes;

  #[test]
  fn generator_and_package_name_reach_the_command() {
    let spec = ArtifactRef {
      name: "openapi.json".to_string(),
      digest: hash_bytes(b"{}"),
    };
    let p = generate(&spec, "typescript-fetch", "mycelium-client").unwrap();
    let generate_argv = p.exec_steps().last().unwrap().to_vec();

    assert_eq!(generate_argv[5], "typescript-fetch");
    assert_eq!(generate_argv.last().unwrap(), "packageName=mycelium-client");
  }
}
