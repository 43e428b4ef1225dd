//! Docker BuildKit engine.
//!
//! Each evaluation renders the description into a Dockerfile, lays out a
//! throwaway build context (materialized source subsets plus referenced
//! artifacts) and runs `docker buildx build`. BuildKit owns layer caching and
//! the cache mounts; this engine only keeps the file artifacts it exported,
//! addressed by content digest, so later pipelines can place them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::dockerfile::{self, ARTIFACTS_DIR, Export, RenderedBuild};
use super::{Engine, EngineError, PublishRequest, Terminal};
use crate::config::EngineConfig;
use crate::pipeline::{BuildResult, ContainerImage, DirectoryArtifact, FileArtifact, PipelineDescription, SecretRef};
use crate::platform::Platform;
use crate::util::hash::{ContentHash, hash_bytes};

const DEFAULT_REGISTRY: &str = "docker.io";

pub struct DockerEngine {
  docker_bin: String,
  state_dir: PathBuf,
  artifacts: Mutex<HashMap<ContentHash, PathBuf>>,
}

impl DockerEngine {
  pub fn new(docker_bin: impl Into<String>, state_dir: impl Into<PathBuf>) -> Self {
    Self {
      docker_bin: docker_bin.into(),
      state_dir: state_dir.into(),
      artifacts: Mutex::new(HashMap::new()),
    }
  }

  pub fn from_config(config: &EngineConfig) -> Self {
    Self::new(config.docker_bin.clone(), config.resolved_state_dir())
  }

  fn artifact_dir(&self) -> PathBuf {
    self.state_dir.join(ARTIFACTS_DIR)
  }

  fn artifact_path(&self, digest: &ContentHash) -> Option<PathBuf> {
    if let Some(path) = self.artifacts.lock().get(digest) {
      return Some(path.clone());
    }
    // Artifacts exported by an earlier process are still addressable.
    let path = self.artifact_dir().join(&digest.0);
    path.is_file().then_some(path)
  }

  async fn store_artifact(&self, contents: &[u8]) -> Result<ContentHash, EngineError> {
    let digest = hash_bytes(contents);
    let dir = self.artifact_dir();
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(&digest.0);
    if !path.exists() {
      tokio::fs::write(&path, contents).await?;
    }
    self.artifacts.lock().insert(digest.clone(), path);
    Ok(digest)
  }

  /// Lay out the build context: Dockerfile, subsets and artifacts.
  async fn prepare_context(&self, rendered: &RenderedBuild) -> Result<tempfile::TempDir, EngineError> {
    tokio::fs::create_dir_all(&self.state_dir).await?;
    let ctx = tempfile::Builder::new().prefix("ctx-").tempdir_in(&self.state_dir)?;

    let subsets = rendered.subsets.clone();
    let root = ctx.path().to_path_buf();
    tokio::task::spawn_blocking(move || {
      for (dir, subset) in &subsets {
        subset.materialize(&root.join(dir))?;
      }
      Ok::<_, EngineError>(())
    })
    .await
    .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;

    if !rendered.artifacts.is_empty() {
      let dest = ctx.path().join(ARTIFACTS_DIR);
      tokio::fs::create_dir_all(&dest).await?;
      for artifact in &rendered.artifacts {
        let src = self
          .artifact_path(&artifact.digest)
          .ok_or_else(|| EngineError::UnknownArtifact {
            name: artifact.name.clone(),
            digest: artifact.digest.0.clone(),
          })?;
        tokio::fs::copy(&src, dest.join(&artifact.digest.0)).await?;
      }
    }

    tokio::fs::write(ctx.path().join("Dockerfile"), &rendered.dockerfile).await?;
    Ok(ctx)
  }

  /// `--secret` flags. Only references are passed; buildx reads the values.
  fn secret_args(rendered: &RenderedBuild) -> Result<Vec<String>, EngineError> {
    let mut args = Vec::new();
    for (key, secret) in &rendered.secrets {
      let spec = match secret {
        SecretRef::Env(var) => {
          if std::env::var_os(var).is_none() {
            return Err(EngineError::Credential {
              reference: secret.to_string(),
              message: "environment variable is not set".to_string(),
            });
          }
          format!("id={},env={}", key, var)
        }
        SecretRef::File(path) => {
          if !path.is_file() {
            return Err(EngineError::Credential {
              reference: secret.to_string(),
              message: "file does not exist".to_string(),
            });
          }
          format!("id={},src={}", key, path.display())
        }
      };
      args.push("--secret".to_string());
      args.push(spec);
    }
    Ok(args)
  }

  async fn run(&self, args: &[String], stdin: Option<&str>) -> Result<Output, EngineError> {
    debug!(cmd = %format!("{} {}", self.docker_bin, args.join(" ")), "spawning docker");

    let mut command = Command::new(&self.docker_bin);
    command
      .args(args)
      .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let mut child = command.spawn()?;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
      pipe.write_all(input.as_bytes()).await?;
      drop(pipe);
    }
    Ok(child.wait_with_output().await?)
  }

  async fn build(
    &self,
    pipeline: &PipelineDescription,
    rendered: &RenderedBuild,
    output: &[String],
  ) -> Result<(), EngineError> {
    let ctx = self.prepare_context(rendered).await?;

    let mut args = vec![
      "buildx".to_string(),
      "build".to_string(),
      "--progress=plain".to_string(),
      "--target".to_string(),
      rendered.target.to_string(),
    ];
    if let Some(platform) = pipeline.platform() {
      args.push("--platform".to_string());
      args.push(platform.to_string());
    }
    args.extend(Self::secret_args(rendered)?);
    args.extend(output.iter().cloned());
    args.push(ctx.path().display().to_string());

    let output = self.run(&args, None).await?;
    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).to_string();
      let (cmd, code) = parse_failure(&stderr);
      debug!(stderr = %stderr, "build stderr");
      warn!(pipeline = %pipeline.name(), "build failed");
      return Err(EngineError::ExecFailed {
        pipeline: pipeline.name().to_string(),
        cmd: cmd.unwrap_or_else(|| "docker buildx build".to_string()),
        code: code.or(output.status.code()),
        output: tail(&stderr, 40),
      });
    }
    Ok(())
  }

  async fn export(&self, pipeline: &PipelineDescription, export: Export<'_>, dest: &Path) -> Result<RenderedBuild, EngineError> {
    let rendered = dockerfile::render(pipeline, export);
    let output = vec!["--output".to_string(), format!("type=local,dest={}", dest.display())];
    self.build(pipeline, &rendered, &output).await?;
    Ok(rendered)
  }
}

#[async_trait]
impl Engine for DockerEngine {
  async fn evaluate(&self, request: Terminal) -> Result<BuildResult, EngineError> {
    let pipeline = request.pipeline();
    let key = pipeline.cache_key()?;
    info!(pipeline = %pipeline.name(), key = %key, terminal = request.kind(), "evaluating pipeline");
    for step in pipeline.redacted_steps() {
      debug!(pipeline = %pipeline.name(), step = %step, "step");
    }

    let result = match &request {
      Terminal::Stdout(pipeline) => {
        let out = tempfile::tempdir()?;
        self.export(pipeline, Export::Stdout, out.path()).await?;
        let stdout = tokio::fs::read_to_string(out.path().join("stdout")).await?;
        BuildResult::Stdout(stdout)
      }
      Terminal::File { pipeline, path } => {
        let out = tempfile::tempdir()?;
        let rendered = self.export(pipeline, Export::File(path), out.path()).await?;
        let name = rendered.exported_file.unwrap_or_default();
        let contents = tokio::fs::read(out.path().join(&name)).await?;
        let digest = self.store_artifact(&contents).await?;
        info!(pipeline = %pipeline.name(), path = %path, digest = %digest.short(), "exported file");
        BuildResult::File(FileArtifact::new(path.clone(), contents))
      }
      Terminal::Directory { pipeline, path, dest } => {
        tokio::fs::create_dir_all(dest).await?;
        self.export(pipeline, Export::Directory(path), dest).await?;
        let files = WalkDir::new(dest)
          .into_iter()
          .filter_map(Result::ok)
          .filter(|e| e.file_type().is_file())
          .count();
        BuildResult::Directory(DirectoryArtifact {
          host_path: dest.clone(),
          files,
        })
      }
      Terminal::Image(pipeline) => {
        let platform = pipeline.platform().or_else(Platform::host).unwrap_or_default();
        let tag = format!("myco/{}:{}-{}", pipeline.name(), key, platform.arch());
        let rendered = dockerfile::render(pipeline, Export::Image);
        let output = vec!["--load".to_string(), "-t".to_string(), tag.clone()];
        self.build(pipeline, &rendered, &output).await?;
        BuildResult::Image(ContainerImage {
          platform,
          locator: tag,
          pipeline_key: key.clone(),
        })
      }
    };

    info!(pipeline = %pipeline.name(), key = %key, "pipeline succeeded");
    Ok(result)
  }

  async fn publish(&self, request: PublishRequest) -> Result<String, EngineError> {
    if request.images.is_empty() {
      return Err(EngineError::Registry {
        message: "no images to publish".to_string(),
      });
    }

    let registry = registry_host(&request.address);
    let password = resolve_secret(&request.credential).await?;
    info!(registry = %registry, user = %request.username, credential = %request.credential, "logging in");

    let login = vec![
      "login".to_string(),
      registry.clone(),
      "-u".to_string(),
      request.username.clone(),
      "--password-stdin".to_string(),
    ];
    let output = self.run(&login, Some(&password)).await?;
    if !output.status.success() {
      return Err(EngineError::Auth {
        registry,
        message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    let mut refs = Vec::with_capacity(request.images.len());
    for image in &request.images {
      let per_arch = format!("{}-{}", request.address, image.platform.arch());
      for args in [
        vec!["tag".to_string(), image.locator.clone(), per_arch.clone()],
        vec!["push".to_string(), per_arch.clone()],
      ] {
        let output = self.run(&args, None).await?;
        if !output.status.success() {
          return Err(EngineError::Registry {
            message: format!(
              "docker {} failed: {}",
              args[0],
              String::from_utf8_lossy(&output.stderr).trim()
            ),
          });
        }
      }
      info!(image = %per_arch, platform = %image.platform, "pushed platform image");
      refs.push(per_arch);
    }

    let mut args = vec![
      "buildx".to_string(),
      "imagetools".to_string(),
      "create".to_string(),
      "-t".to_string(),
      request.address.clone(),
    ];
    args.extend(refs);
    let output = self.run(&args, None).await?;
    if !output.status.success() {
      return Err(EngineError::Registry {
        message: format!(
          "manifest assembly failed: {}",
          String::from_utf8_lossy(&output.stderr).trim()
        ),
      });
    }

    info!(address = %request.address, "published multi-arch image");
    Ok(request.address)
  }
}

async fn resolve_secret(secret: &SecretRef) -> Result<String, EngineError> {
  let credential_err = |message: String| EngineError::Credential {
    reference: secret.to_string(),
    message,
  };
  match secret {
    SecretRef::Env(var) => std::env::var(var).map_err(|e| credential_err(e.to_string())),
    SecretRef::File(path) => tokio::fs::read_to_string(path)
      .await
      .map(|s| s.trim().to_string())
      .map_err(|e| credential_err(e.to_string())),
  }
}

/// Registry host of an image address; bare `namespace/image` means Docker Hub.
fn registry_host(address: &str) -> String {
  match address.split_once('/') {
    Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => first.to_string(),
    _ => DEFAULT_REGISTRY.to_string(),
  }
}

/// Extract the failing command and its exit code from BuildKit output.
///
/// BuildKit reports `ERROR: process "<cmd>" did not complete successfully: exit code: <n>`.
fn parse_failure(stderr: &str) -> (Option<String>, Option<i32>) {
  let Some(line) = stderr.lines().rev().find(|l| l.contains("did not complete successfully")) else {
    return (None, None);
  };
  let cmd = line
    .split_once("process \"")
    .and_then(|(_, rest)| rest.rsplit_once("\" did not complete"))
    .map(|(cmd, _)| cmd.replace("\\\"", "\""))
    .map(|cmd| match cmd.strip_prefix(&capture_prefix()) {
      Some(argv) => argv.to_string(),
      None => cmd,
    });
  let code = line
    .rsplit_once("exit code: ")
    .and_then(|(_, code)| code.trim().parse().ok());
  if cmd.is_none() {
    warn!(line = %line, "unrecognized buildkit failure line");
  }
  (cmd, code)
}

/// How BuildKit prints a command wrapped for stdout capture.
fn capture_prefix() -> String {
  format!("/bin/sh -c {} ", dockerfile::STDOUT_CAPTURE)
}

fn tail(text: &str, lines: usize) -> String {
  let all: Vec<&str> = text.lines().collect();
  all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pipeline::{ArtifactRef, ImageRef};

  #[test]
  fn parse_failure_extracts_command_and_code() {
    let stderr = "#9 [pipeline 4/4] RUN cargo test\n#9 ERROR: process \"cargo test\" did not complete successfully: exit code: 101\n";
    let (cmd, code) = parse_failure(stderr);
    assert_eq!(cmd.as_deref(), Some("cargo test"));
    assert_eq!(code, Some(101));
  }

  #[test]
  fn parse_failure_unwraps_stdout_capture() {
    let wrapped = format!("{}cargo test", capture_prefix()).replace('"', "\\\"");
    let stderr = format!(
      "#9 0.41 test tests::parses ... FAILED\n#9 ERROR: process \"{}\" did not complete successfully: exit code: 101\n",
      wrapped
    );
    let (cmd, code) = parse_failure(&stderr);
    assert_eq!(cmd.as_deref(), Some("cargo test"));
    assert_eq!(code, Some(101));
  }

  #[test]
  fn parse_failure_without_marker() {
    assert_eq!(parse_failure("failed to solve: image not found"), (None, None));
  }

  #[test]
  fn registry_host_defaults_to_docker_hub() {
    assert_eq!(registry_host("mycelium/mycelium-backend:latest"), "docker.io");
    assert_eq!(registry_host("ghcr.io/mycelium/backend:v2"), "ghcr.io");
    assert_eq!(registry_host("localhost:5000/backend:v2"), "localhost:5000");
  }

  #[test]
  fn tail_keeps_last_lines() {
    assert_eq!(tail("a\nb\nc", 2), "b\nc");
    assert_eq!(tail("a", 5), "a");
  }

  #[tokio::test]
  async fn stored_artifacts_are_addressable_by_digest() {
    let state = tempfile::tempdir().unwrap();
    let engine = DockerEngine::new("docker", state.path());

    let digest = engine.store_artifact(b"jar bytes").await.unwrap();
    let path = engine.artifact_path(&digest).unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"jar bytes");

    // A second engine on the same state dir finds it on disk.
    let other = DockerEngine::new("docker", state.path());
    assert!(other.artifact_path(&digest).is_some());
  }

  #[tokio::test]
  async fn unknown_artifact_fails_before_building() {
    let state = tempfile::tempdir().unwrap();
    let engine = DockerEngine::new("docker-binary-that-does-not-exist", state.path());
    let pipeline = PipelineDescription::from_image("native", ImageRef::parse("busybox").unwrap()).with_file(
      "/build/app.jar",
      ArtifactRef {
        name: "app.jar".to_string(),
        digest: hash_bytes(b"never exported"),
      },
    );

    let err = engine.image(pipeline).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownArtifact { .. }));
  }

  #[tokio::test]
  async fn missing_env_secret_is_reported_by_reference() {
    let state = tempfile::tempdir().unwrap();
    let engine = DockerEngine::new("docker-binary-that-does-not-exist", state.path());
    let pipeline = PipelineDescription::from_image("app", ImageRef::parse("busybox").unwrap())
      .with_secret("TOKEN", SecretRef::Env("MYCO_TEST_SECRET_THAT_IS_NOT_SET".to_string()))
      .with_exec(["true"]);

    let err = engine.stdout(pipeline).await.unwrap_err();
    match err {
      EngineError::Credential { reference, .. } => {
        assert_eq!(reference, "env:MYCO_TEST_SECRET_THAT_IS_NOT_SET")
      }
      other => panic!("unexpected error: {other}"),
    }
  }
}
