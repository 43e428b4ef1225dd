//! Rendering of pipeline descriptions as BuildKit Dockerfiles.
//!
//! Every transition maps onto one Dockerfile instruction. Cache volumes and
//! secrets are BuildKit mounts, which apply per `RUN`; once declared they are
//! attached to every later `RUN` of the pipeline.

use std::fmt::Write as _;

use serde_json::Value;

use crate::pipeline::{ArtifactRef, PipelineDescription, SecretRef, Transition};
use crate::source::SourceSubset;

pub const PIPELINE_STAGE: &str = "pipeline";
pub const EXPORT_STAGE: &str = "export";
pub const STDOUT_PATH: &str = "/.myco/stdout";
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Shell script that runs `"$0" "$@"` with stdout captured to
/// [`STDOUT_PATH`]. On failure the captured stdout is replayed on stderr so it
/// lands in the build log.
pub const STDOUT_CAPTURE: &str =
  "mkdir -p /.myco && \"$0\" \"$@\" > /.myco/stdout || { status=$?; cat /.myco/stdout >&2; exit $status; }";

/// What the build should export besides the final stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Export<'a> {
  Image,
  Stdout,
  File(&'a str),
  Directory(&'a str),
}

/// A rendered build: the Dockerfile plus what must be placed in the context.
#[derive(Debug, Clone)]
pub struct RenderedBuild {
  pub dockerfile: String,
  pub target: &'static str,
  /// Context directory name and the subset to materialize into it
  pub subsets: Vec<(String, SourceSubset)>,
  pub artifacts: Vec<ArtifactRef>,
  pub secrets: Vec<(String, SecretRef)>,
  /// File name of the exported file, for `Export::File`
  pub exported_file: Option<String>,
}

fn json_array(argv: &[String]) -> String {
  Value::from(argv.to_vec()).to_string()
}

fn json_string(value: &str) -> String {
  Value::from(value).to_string()
}

/// Resolve `path` against the workdir the way `WORKDIR` would.
fn resolve(workdir: &str, path: &str) -> String {
  if path.starts_with('/') {
    path.to_string()
  } else {
    format!("{}/{}", workdir.trim_end_matches('/'), path)
  }
}

pub fn render(pipeline: &PipelineDescription, export: Export<'_>) -> RenderedBuild {
  let mut out = String::new();
  let mut mounts: Vec<String> = Vec::new();
  let mut subsets = Vec::new();
  let mut artifacts = Vec::new();
  let mut secrets = Vec::new();
  let mut workdir = "/".to_string();

  let last_exec = pipeline
    .steps()
    .iter()
    .rposition(|s| matches!(s, Transition::Exec { .. }));

  let _ = writeln!(out, "# syntax=docker/dockerfile:1.10");
  let _ = writeln!(out, "# pipeline: {}", pipeline.name());
  match pipeline.platform() {
    Some(platform) => {
      let _ = writeln!(
        out,
        "FROM --platform={} {} AS {}",
        platform,
        pipeline.base_image(),
        PIPELINE_STAGE
      );
    }
    None => {
      let _ = writeln!(out, "FROM {} AS {}", pipeline.base_image(), PIPELINE_STAGE);
    }
  }

  let run_prefix = |mounts: &[String]| -> String {
    if mounts.is_empty() {
      "RUN ".to_string()
    } else {
      format!("RUN {} ", mounts.join(" "))
    }
  };

  for (idx, step) in pipeline.steps().iter().enumerate() {
    match step {
      Transition::InstallPackages { packages } => {
        let specs: Vec<String> = packages.iter().map(|p| p.spec()).collect();
        let _ = writeln!(
          out,
          "{}apt-get update && apt-get install -y --no-install-recommends {} && rm -rf /var/lib/apt/lists/*",
          run_prefix(&mounts),
          specs.join(" ")
        );
      }
      Transition::MountCache { path, volume } => {
        mounts.push(format!("--mount=type=cache,id={},target={},sharing=locked", volume, path));
      }
      Transition::MountDirectory { path, subset } => {
        let dir = format!("src-{}", subsets.len());
        let _ = writeln!(out, "COPY {}/ {}/", dir, path.trim_end_matches('/'));
        subsets.push((dir, subset.clone()));
      }
      Transition::SetWorkdir { path } => {
        workdir = resolve(&workdir, path);
        let _ = writeln!(out, "WORKDIR {}", path);
      }
      Transition::SetEnv { key, value } => {
        let _ = writeln!(out, "ENV {}={}", key, json_string(value));
      }
      Transition::SetSecret { key, secret } => {
        mounts.push(format!("--mount=type=secret,id={},env={}", key, key));
        secrets.push((key.clone(), secret.clone()));
      }
      Transition::Exec { argv } => {
        if export == Export::Stdout && Some(idx) == last_exec {
          let mut wrapped = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            STDOUT_CAPTURE.to_string(),
          ];
          wrapped.extend(argv.iter().cloned());
          let _ = writeln!(out, "{}{}", run_prefix(&mounts), json_array(&wrapped));
        } else {
          let _ = writeln!(out, "{}{}", run_prefix(&mounts), json_array(argv));
        }
      }
      Transition::WithFile { path, artifact } => {
        let _ = writeln!(out, "COPY {}/{} {}", ARTIFACTS_DIR, artifact.digest, path);
        artifacts.push(artifact.clone());
      }
      Transition::Entrypoint { argv } => {
        let _ = writeln!(out, "ENTRYPOINT {}", json_array(argv));
      }
    }
  }

  let mut exported_file = None;
  let target = match export {
    Export::Image => PIPELINE_STAGE,
    Export::Stdout => {
      if last_exec.is_none() {
        let _ = writeln!(out, "RUN mkdir -p /.myco && : > {}", STDOUT_PATH);
      }
      let _ = writeln!(out, "FROM scratch AS {}", EXPORT_STAGE);
      let _ = writeln!(out, "COPY --from={} {} /stdout", PIPELINE_STAGE, STDOUT_PATH);
      EXPORT_STAGE
    }
    Export::File(path) => {
      let resolved = resolve(&workdir, path);
      let name = resolved.rsplit('/').next().unwrap_or("artifact").to_string();
      let _ = writeln!(out, "FROM scratch AS {}", EXPORT_STAGE);
      let _ = writeln!(out, "COPY --from={} {} /{}", PIPELINE_STAGE, resolved, name);
      exported_file = Some(name);
      EXPORT_STAGE
    }
    Export::Directory(path) => {
      let resolved = resolve(&workdir, path);
      let _ = writeln!(out, "FROM scratch AS {}", EXPORT_STAGE);
      let _ = writeln!(
        out,
        "COPY --from={} {}/ /",
        PIPELINE_STAGE,
        resolved.trim_end_matches('/')
      );
      EXPORT_STAGE
    }
  };

  RenderedBuild {
    dockerfile: out,
    target,
    subsets,
    artifacts,
    secrets,
    exported_file,
  }
}
