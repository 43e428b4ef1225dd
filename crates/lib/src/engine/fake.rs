//! In-memory engine for tests.
//!
//! Records every evaluation and publish, counts calls per pipeline name and
//! fails the pipelines it was told to fail. File artifacts are tracked by
//! digest exactly like a real engine, so a pipeline placing a file that was
//! never produced fails with `UnknownArtifact`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Engine, EngineError, PublishRequest, Terminal};
use crate::pipeline::{BuildResult, ContainerImage, DirectoryArtifact, FileArtifact, PipelineDescription, Transition};
use crate::platform::Platform;
use crate::util::hash::{ContentHash, ObjectHash};

/// One recorded call to [`Engine::evaluate`].
#[derive(Debug, Clone)]
pub struct Evaluation {
  pub pipeline: String,
  pub terminal: &'static str,
  pub cache_key: ObjectHash,
  pub description: PipelineDescription,
}

#[derive(Default)]
struct FakeState {
  evaluations: Vec<Evaluation>,
  publishes: Vec<PublishRequest>,
  produced: HashSet<ContentHash>,
  in_flight: usize,
  finished: usize,
}

/// Counts an evaluation as in flight until its future returns or is dropped.
struct InFlight<'a>(&'a Mutex<FakeState>);

impl<'a> InFlight<'a> {
  fn enter(state: &'a Mutex<FakeState>) -> Self {
    state.lock().in_flight += 1;
    Self(state)
  }
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.0.lock().in_flight -= 1;
  }
}

#[derive(Default)]
pub struct FakeEngine {
  failing: BTreeSet<String>,
  stdout: BTreeMap<String, String>,
  reject_auth: bool,
  delay: Option<Duration>,
  state: Mutex<FakeState>,
}

impl FakeEngine {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every evaluation of `pipeline` fail as if its last command exited 1.
  pub fn failing(mut self, pipeline: &str) -> Self {
    self.failing.insert(pipeline.to_string());
    self
  }

  pub fn with_stdout(mut self, pipeline: &str, stdout: &str) -> Self {
    self.stdout.insert(pipeline.to_string(), stdout.to_string());
    self
  }

  /// Reject registry logins.
  pub fn rejecting_auth(mut self) -> Self {
    self.reject_auth = true;
    self
  }

  /// Sleep this long inside every evaluation.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn evaluations(&self) -> Vec<Evaluation> {
    self.state.lock().evaluations.clone()
  }

  pub fn publishes(&self) -> Vec<PublishRequest> {
    self.state.lock().publishes.clone()
  }

  /// Number of evaluations of pipelines named `pipeline`.
  pub fn calls(&self, pipeline: &str) -> usize {
    self
      .state
      .lock()
      .evaluations
      .iter()
      .filter(|e| e.pipeline == pipeline)
      .count()
  }

  /// Number of evaluations whose name starts with `prefix`.
  pub fn calls_with_prefix(&self, prefix: &str) -> usize {
    self
      .state
      .lock()
      .evaluations
      .iter()
      .filter(|e| e.pipeline.starts_with(prefix))
      .count()
  }

  pub fn total_calls(&self) -> usize {
    self.state.lock().evaluations.len()
  }

  /// Evaluations currently running.
  pub fn in_flight(&self) -> usize {
    self.state.lock().in_flight
  }

  /// Evaluations that ran past their delay, whatever their outcome.
  pub fn finished(&self) -> usize {
    self.state.lock().finished
  }
}

#[async_trait]
impl Engine for FakeEngine {
  async fn evaluate(&self, request: Terminal) -> Result<BuildResult, EngineError> {
    let pipeline = request.pipeline();
    let cache_key = pipeline.cache_key()?;
    self.state.lock().evaluations.push(Evaluation {
      pipeline: pipeline.name().to_string(),
      terminal: request.kind(),
      cache_key: cache_key.clone(),
      description: pipeline.clone(),
    });

    let _in_flight = InFlight::enter(&self.state);

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    self.state.lock().finished += 1;

    for step in pipeline.steps() {
      if let Transition::WithFile { artifact, .. } = step
        && !self.state.lock().produced.contains(&artifact.digest)
      {
        return Err(EngineError::UnknownArtifact {
          name: artifact.name.clone(),
          digest: artifact.digest.0.clone(),
        });
      }
    }

    if self.failing.contains(pipeline.name()) {
      let cmd = pipeline.exec_steps().last().map(|argv| argv.join(" ")).unwrap_or_default();
      return Err(EngineError::ExecFailed {
        pipeline: pipeline.name().to_string(),
        cmd,
        code: Some(1),
        output: "simulated failure".to_string(),
      });
    }

    let result = match request {
      Terminal::Stdout(pipeline) => BuildResult::Stdout(
        self
          .stdout
          .get(pipeline.name())
          .cloned()
          .unwrap_or_else(|| format!("{} ok\n", pipeline.name())),
      ),
      Terminal::File { pipeline, path } => {
        let contents = format!("{}:{}:{}", pipeline.name(), cache_key, path).into_bytes();
        let file = FileArtifact::new(path, contents);
        self.state.lock().produced.insert(file.digest.clone());
        BuildResult::File(file)
      }
      Terminal::Directory { pipeline, dest, .. } => {
        tokio::fs::create_dir_all(&dest).await?;
        tokio::fs::write(dest.join("GENERATED"), pipeline.name()).await?;
        BuildResult::Directory(DirectoryArtifact {
          host_path: dest,
          files: 1,
        })
      }
      Terminal::Image(pipeline) => {
        let platform = pipeline.platform().unwrap_or_default();
        BuildResult::Image(ContainerImage {
          platform,
          locator: format!("fake/{}:{}-{}", pipeline.name(), cache_key, platform.arch()),
          pipeline_key: cache_key,
        })
      }
    };
    Ok(result)
  }

  async fn publish(&self, request: PublishRequest) -> Result<String, EngineError> {
    self.state.lock().publishes.push(request.clone());

    if self.reject_auth {
      return Err(EngineError::Auth {
        registry: "docker.io".to_string(),
        message: "unauthorized: incorrect username or password".to_string(),
      });
    }

    let platforms: BTreeSet<Platform> = request.images.iter().map(|i| i.platform).collect();
    if request.images.is_empty() || platforms.len() != request.images.len() {
      return Err(EngineError::Registry {
        message: "manifest list needs one image per platform".to_string(),
      });
    }
    Ok(request.address)
  }
}
