//! Pipeline evaluation.
//!
//! Descriptions are inert until a terminal action is requested: capture the
//! stdout of the last command, extract a file or directory, or produce an
//! image. The [`Engine`] trait is the single evaluation entry point; the
//! orchestration core never runs containers itself.
//!
//! Engines own layer caching. A pipeline whose command fails yields an error
//! and no artifact; nothing from it is exported or recorded as produced.

pub mod docker;
pub mod dockerfile;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::pipeline::{BuildResult, ContainerImage, DirectoryArtifact, FileArtifact, PipelineDescription, SecretRef};
use crate::source::ProjectionError;
use crate::util::hash::HashError;

pub use docker::DockerEngine;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeEngine;

/// Errors that can occur while evaluating or publishing.
#[derive(Debug, Error)]
pub enum EngineError {
  /// A command inside the pipeline exited non-zero. `output` is the tail of
  /// the build log, including the command's own output.
  #[error("pipeline '{pipeline}' failed ({}): {cmd}", exit_status(.code))]
  ExecFailed {
    pipeline: String,
    cmd: String,
    code: Option<i32>,
    output: String,
  },

  #[error("artifact {name} ({digest}) was not produced by this engine")]
  UnknownArtifact { name: String, digest: String },

  #[error("credential {reference} could not be resolved: {message}")]
  Credential { reference: String, message: String },

  #[error("registry authentication failed for {registry}: {message}")]
  Auth { registry: String, message: String },

  #[error("registry error: {message}")]
  Registry { message: String },

  #[error("expected a {expected} result, got {actual}")]
  UnexpectedResult {
    expected: &'static str,
    actual: &'static str,
  },

  #[error(transparent)]
  Projection(#[from] ProjectionError),

  #[error("failed to compute cache key: {0}")]
  Hash(#[from] HashError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl EngineError {
  /// Diagnostic output of a failed command, if any was captured.
  pub fn output(&self) -> Option<&str> {
    match self {
      Self::ExecFailed { output, .. } if !output.trim().is_empty() => Some(output),
      _ => None,
    }
  }
}

fn exit_status(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("exit code {}", code),
    None => "terminated by signal".to_string(),
  }
}

/// A terminal action: what to get out of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
  /// Stdout of the last `Exec` step
  Stdout(PipelineDescription),
  /// One file, relative paths resolved against the final workdir
  File { pipeline: PipelineDescription, path: String },
  /// A directory exported to `dest` on the host
  Directory {
    pipeline: PipelineDescription,
    path: String,
    dest: PathBuf,
  },
  /// The final container state as an image
  Image(PipelineDescription),
}

impl Terminal {
  pub fn pipeline(&self) -> &PipelineDescription {
    match self {
      Self::Stdout(pipeline) | Self::Image(pipeline) => pipeline,
      Self::File { pipeline, .. } | Self::Directory { pipeline, .. } => pipeline,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Self::Stdout(_) => "stdout",
      Self::File { .. } => "file",
      Self::Directory { .. } => "directory",
      Self::Image(_) => "image",
    }
  }
}

/// Publish several platform images under one multi-architecture reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
  /// `<namespace>/<image>:<tag>`
  pub address: String,
  pub username: String,
  pub credential: SecretRef,
  pub images: Vec<ContainerImage>,
}

#[async_trait]
pub trait Engine: Send + Sync {
  /// Evaluate a pipeline up to the requested terminal action.
  async fn evaluate(&self, request: Terminal) -> Result<BuildResult, EngineError>;

  /// Push images and assemble them into one manifest list. Returns the
  /// published reference.
  async fn publish(&self, request: PublishRequest) -> Result<String, EngineError>;

  async fn stdout(&self, pipeline: PipelineDescription) -> Result<String, EngineError> {
    let result = self.evaluate(Terminal::Stdout(pipeline)).await?;
    let actual = result.kind();
    result.into_stdout().ok_or(EngineError::UnexpectedResult {
      expected: "stdout",
      actual,
    })
  }

  async fn file(&self, pipeline: PipelineDescription, path: &str) -> Result<FileArtifact, EngineError> {
    let result = self
      .evaluate(Terminal::File {
        pipeline,
        path: path.to_string(),
      })
      .await?;
    let actual = result.kind();
    result.into_file().ok_or(EngineError::UnexpectedResult {
      expected: "file",
      actual,
    })
  }

  async fn directory(
    &self,
    pipeline: PipelineDescription,
    path: &str,
    dest: PathBuf,
  ) -> Result<DirectoryArtifact, EngineError> {
    let result = self
      .evaluate(Terminal::Directory {
        pipeline,
        path: path.to_string(),
        dest,
      })
      .await?;
    let actual = result.kind();
    result.into_directory().ok_or(EngineError::UnexpectedResult {
      expected: "directory",
      actual,
    })
  }

  async fn image(&self, pipeline: PipelineDescription) -> Result<ContainerImage, EngineError> {
    let result = self.evaluate(Terminal::Image(pipeline)).await?;
    let actual = result.kind();
    result.into_image().ok_or(EngineError::UnexpectedResult {
      expected: "image",
      actual,
    })
  }
}
