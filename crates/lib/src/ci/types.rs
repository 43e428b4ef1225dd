//! Types for the aggregate CI run.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builders::{BuildContext, BuildError, app, backend, central, peripheral};
use crate::consts::CI_SUCCESS_MESSAGE;
use crate::engine::EngineError;
use crate::pipeline::PipelineDescription;
use crate::platform::Platform;

/// One component build or test the CI run can include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CiTask {
  BuildPeripheral,
  TestCentral,
  BuildCentral,
  BuildBackend,
  TestBackend,
  BuildApp,
}

impl CiTask {
  pub const ALL: [CiTask; 6] = [
    CiTask::BuildPeripheral,
    CiTask::TestCentral,
    CiTask::BuildCentral,
    CiTask::BuildBackend,
    CiTask::TestBackend,
    CiTask::BuildApp,
  ];

  /// The task set run when none is configured.
  pub const DEFAULT: [CiTask; 5] = [
    CiTask::BuildPeripheral,
    CiTask::TestCentral,
    CiTask::BuildBackend,
    CiTask::TestBackend,
    CiTask::BuildApp,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::BuildPeripheral => "build-peripheral",
      Self::TestCentral => "test-central",
      Self::BuildCentral => "build-central",
      Self::BuildBackend => "build-backend",
      Self::TestBackend => "test-backend",
      Self::BuildApp => "build-app",
    }
  }

  /// Describe the task's pipeline. `platform` selects the firmware target;
  /// the other components build on the engine's native platform.
  pub fn describe(&self, ctx: &BuildContext<'_>, platform: Platform) -> Result<PipelineDescription, BuildError> {
    match self {
      Self::BuildPeripheral => peripheral::build(ctx, platform),
      Self::TestCentral => central::test(ctx, None),
      Self::BuildCentral => central::build(ctx, None),
      Self::BuildBackend => backend::build(ctx),
      Self::TestBackend => backend::test(ctx),
      Self::BuildApp => app::build(ctx, None),
    }
  }
}

impl fmt::Display for CiTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for CiTask {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL.iter().copied().find(|t| t.as_str() == s).ok_or_else(|| {
      let known: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
      format!("unknown CI task '{}' (expected one of: {})", s, known.join(", "))
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiConfig {
  pub tasks: Vec<CiTask>,
  /// Firmware target platform
  pub platform: Platform,
  /// Maximum number of pipelines evaluated at once
  pub parallelism: usize,
  pub timeout: Option<Duration>,
}

impl Default for CiConfig {
  fn default() -> Self {
    Self {
      tasks: CiTask::DEFAULT.to_vec(),
      platform: Platform::LinuxAmd64,
      parallelism: CiTask::DEFAULT.len(),
      timeout: None,
    }
  }
}

/// Result of one successful task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
  pub task: CiTask,
  pub duration_ms: u128,
  pub stdout: String,
}

/// A task that did not succeed.
#[derive(Debug)]
pub struct TaskFailure {
  pub task: CiTask,
  pub error: EngineError,
}

/// Report of a fully successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CiReport {
  pub message: String,
  pub tasks: Vec<TaskSummary>,
}

impl CiReport {
  pub(crate) fn new(tasks: Vec<TaskSummary>) -> Self {
    Self {
      message: CI_SUCCESS_MESSAGE.to_string(),
      tasks,
    }
  }
}

#[derive(Debug, Error)]
pub enum CiError {
  #[error("no CI tasks configured")]
  NoTasks,

  #[error("CI task {task} could not be described: {source}")]
  Build {
    task: CiTask,
    #[source]
    source: BuildError,
  },

  /// Every task ran to completion and at least one failed.
  #[error("CI failed: {} of {total} task(s) failed: {}", failures.len(), failed_names(failures))]
  AggregateFailure {
    failures: Vec<TaskFailure>,
    succeeded: Vec<CiTask>,
    total: usize,
  },

  #[error("CI run cancelled")]
  Cancelled,

  #[error("CI run timed out after {}", humantime::format_duration(*timeout))]
  TimedOut { timeout: Duration },
}

fn failed_names(failures: &[TaskFailure]) -> String {
  failures.iter().map(|f| f.task.as_str()).collect::<Vec<_>>().join(", ")
}
