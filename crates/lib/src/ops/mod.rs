//! Exposed operations.
//!
//! Every command the orchestrator exposes is a variant of [`Operation`], with
//! its arguments already parsed and defaulted by the caller. The
//! [`Orchestrator`] maps each variant onto builders and one engine
//! evaluation; description building and evaluation never interleave.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::builders::{BuildContext, BuildError, app, backend, central, client, native, peripheral};
use crate::cache::VolumeRegistry;
use crate::ci::{self, CiError, CiReport};
use crate::config::MycoConfig;
use crate::engine::{Engine, EngineError};
use crate::matrix::{self, PublishError, PublishReceipt};
use crate::pipeline::{ArtifactRef, DirectoryArtifact, PipelineDescription, SecretRef};
use crate::platform::Platform;
use crate::source::SourceTree;
use crate::util::hash::{ObjectHash, hash_bytes};

#[derive(Debug, Error)]
pub enum OpsError {
  #[error(transparent)]
  Build(#[from] BuildError),

  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error(transparent)]
  Publish(#[from] PublishError),

  #[error(transparent)]
  Ci(#[from] CiError),

  #[error("operation {0} has no single pipeline")]
  Unsupported(&'static str),
}

impl OpsError {
  /// Output of the failed command, for errors raised by one pipeline. CI
  /// failures carry theirs per task.
  pub fn diagnostics(&self) -> Option<&str> {
    match self {
      Self::Engine(e) => e.output(),
      Self::Publish(PublishError::Engine { source, .. }) => source.output(),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
  BuildBackend,
  TestBackend,
  BuildApp {
    platform: Option<Platform>,
  },
  BuildCentral {
    platform: Option<Platform>,
  },
  TestCentral {
    platform: Option<Platform>,
  },
  BuildPeripheral {
    platform: Platform,
  },
  PublishBackend {
    credential: SecretRef,
    tag: Option<String>,
    platforms: Option<Vec<Platform>>,
  },
  CreateClient {
    generator: String,
    package_name: String,
    out: PathBuf,
  },
  Ci {
    platform: Option<Platform>,
    timeout: Option<Duration>,
  },
}

impl Operation {
  /// Command names, in the order they are listed to users.
  pub const NAMES: [&'static str; 9] = [
    "build-backend",
    "test-backend",
    "build-app",
    "build-central",
    "test-central",
    "build-peripheral",
    "publish-backend",
    "create-client",
    "ci",
  ];

  pub fn name(&self) -> &'static str {
    match self {
      Self::BuildBackend => "build-backend",
      Self::TestBackend => "test-backend",
      Self::BuildApp { .. } => "build-app",
      Self::BuildCentral { .. } => "build-central",
      Self::TestCentral { .. } => "test-central",
      Self::BuildPeripheral { .. } => "build-peripheral",
      Self::PublishBackend { .. } => "publish-backend",
      Self::CreateClient { .. } => "create-client",
      Self::Ci { .. } => "ci",
    }
  }
}

/// Result of running an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationOutput {
  Stdout { pipeline: String, stdout: String },
  Published(PublishReceipt),
  Client(DirectoryArtifact),
  Ci(CiReport),
}

/// A described, unevaluated pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPipeline {
  pub name: String,
  pub base_image: String,
  pub platform: Option<Platform>,
  pub cache_key: ObjectHash,
  pub steps: Vec<String>,
}

impl PlannedPipeline {
  fn from_description(pipeline: &PipelineDescription) -> Result<Self, EngineError> {
    Ok(Self {
      name: pipeline.name().to_string(),
      base_image: pipeline.base_image().to_string(),
      platform: pipeline.platform(),
      cache_key: pipeline.cache_key()?,
      steps: pipeline.redacted_steps(),
    })
  }
}

pub struct Orchestrator {
  engine: Arc<dyn Engine>,
  tree: SourceTree,
  volumes: VolumeRegistry,
  config: MycoConfig,
  cancel: CancellationToken,
}

impl Orchestrator {
  pub fn new(engine: Arc<dyn Engine>, tree: SourceTree, config: MycoConfig) -> Self {
    Self {
      engine,
      tree,
      volumes: VolumeRegistry::new(),
      config,
      cancel: CancellationToken::new(),
    }
  }

  /// Cancelling `token` aborts an in-flight CI run.
  pub fn with_cancel(mut self, token: CancellationToken) -> Self {
    self.cancel = token;
    self
  }

  pub fn config(&self) -> &MycoConfig {
    &self.config
  }

  pub fn tree(&self) -> &SourceTree {
    &self.tree
  }

  pub fn volumes(&self) -> &VolumeRegistry {
    &self.volumes
  }

  fn context(&self) -> BuildContext<'_> {
    BuildContext::new(&self.tree, &self.volumes)
  }

  /// The pipeline of an operation that evaluates exactly one, if it is one.
  fn single(&self, op: &Operation) -> Option<Result<PipelineDescription, BuildError>> {
    let ctx = self.context();
    let pipeline = match op {
      Operation::BuildBackend => backend::build(&ctx),
      Operation::TestBackend => backend::test(&ctx),
      Operation::BuildApp { platform } => app::build(&ctx, *platform),
      Operation::BuildCentral { platform } => central::build(&ctx, *platform),
      Operation::TestCentral { platform } => central::test(&ctx, *platform),
      Operation::BuildPeripheral { platform } => peripheral::build(&ctx, *platform),
      Operation::PublishBackend { .. } | Operation::CreateClient { .. } | Operation::Ci { .. } => return None,
    };
    Some(pipeline)
  }

  /// Describe the pipelines an operation would evaluate, without evaluating.
  ///
  /// Pipelines that consume an artifact of an earlier one are described
  /// against a placeholder reference, so their cache keys are indicative only.
  pub fn plan(&self, op: &Operation) -> Result<Vec<PlannedPipeline>, OpsError> {
    let ctx = self.context();
    let placeholder = |name: &str| ArtifactRef {
      name: name.to_string(),
      digest: hash_bytes(name.as_bytes()),
    };

    let pipelines = match op {
      Operation::PublishBackend { platforms, .. } => {
        let platforms = platforms.clone().unwrap_or_else(|| self.config.publish.platforms.clone());
        let jar = placeholder("backend-assembly-1.0.jar");
        let binary = placeholder("mycelium-backend");
        let mut pipelines = vec![backend::assembly(&ctx)?];
        for platform in platforms {
          pipelines.push(native::compile(&ctx, platform, &jar)?);
          pipelines.push(native::runtime_image(platform, &binary)?);
        }
        pipelines
      }
      Operation::CreateClient {
        generator,
        package_name,
        ..
      } => vec![
        backend::openapi(&ctx)?,
        client::generate(&placeholder("openapi.json"), generator, package_name)?,
      ],
      Operation::Ci { platform, timeout } => {
        let config = self.config.ci_config(*platform, *timeout);
        let mut pipelines = Vec::new();
        for task in &config.tasks {
          pipelines.push(task.describe(&ctx, config.platform)?);
        }
        pipelines
      }
      other => self.single(other).transpose()?.into_iter().collect(),
    };

    Ok(
      pipelines
        .iter()
        .map(PlannedPipeline::from_description)
        .collect::<Result<Vec<_>, _>>()?,
    )
  }

  /// Run an operation to completion.
  pub async fn run(&self, op: Operation) -> Result<OperationOutput, OpsError> {
    info!(operation = op.name(), "running operation");

    match op {
      Operation::PublishBackend {
        credential,
        tag,
        platforms,
      } => {
        let options = self.config.publish_options(credential, tag, platforms);
        let receipt = matrix::publish_backend(self.engine.clone(), &self.context(), &options).await?;
        Ok(OperationOutput::Published(receipt))
      }
      Operation::CreateClient {
        generator,
        package_name,
        out,
      } => {
        let openapi = backend::openapi(&self.context())?;
        let spec = self.engine.file(openapi, backend::OPENAPI_JSON).await?;
        let generate = client::generate(&spec.reference(), &generator, &package_name)?;
        let dir = self.engine.directory(generate, client::OUTPUT_DIR, out).await?;
        Ok(OperationOutput::Client(dir))
      }
      Operation::Ci { platform, timeout } => {
        let config = self.config.ci_config(platform, timeout);
        let report = ci::run_ci(self.engine.clone(), &self.context(), &config, self.cancel.clone()).await?;
        Ok(OperationOutput::Ci(report))
      }
      other => {
        let Some(pipeline) = self.single(&other).transpose()? else {
          return Err(OpsError::Unsupported(other.name()));
        };
        let name = pipeline.name().to_string();
        let stdout = self.engine.stdout(pipeline).await?;
        Ok(OperationOutput::Stdout { pipeline: name, stdout })
      }
    }
  }
}
