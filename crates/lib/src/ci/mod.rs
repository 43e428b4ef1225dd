//! Aggregate CI orchestrator.
//!
//! Runs every configured component pipeline concurrently and reports one
//! combined outcome. It:
//! 1. Describes every task up front, so a projection error fails the run
//!    before any pipeline is evaluated
//! 2. Spawns one task per pipeline, bounded by a semaphore
//! 3. Joins all of them, whatever their individual outcome
//! 4. Only then decides between success and an aggregate failure
//!
//! Cancelling the token or hitting the timeout aborts every in-flight task.

pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::builders::BuildContext;
use crate::engine::{Engine, EngineError};

pub use types::{CiConfig, CiError, CiReport, CiTask, TaskFailure, TaskSummary};

struct TaskOutcome {
  task: CiTask,
  duration_ms: u128,
  result: Result<String, EngineError>,
}

/// Run the CI task set in `config`.
pub async fn run_ci(
  engine: Arc<dyn Engine>,
  ctx: &BuildContext<'_>,
  config: &CiConfig,
  cancel: CancellationToken,
) -> Result<CiReport, CiError> {
  if config.tasks.is_empty() {
    return Err(CiError::NoTasks);
  }

  let mut pipelines = Vec::with_capacity(config.tasks.len());
  for task in &config.tasks {
    let pipeline = task
      .describe(ctx, config.platform)
      .map_err(|source| CiError::Build { task: *task, source })?;
    pipelines.push((*task, pipeline));
  }

  info!(
    tasks = pipelines.len(),
    parallelism = config.parallelism,
    platform = %config.platform,
    "starting CI run"
  );

  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut join_set = JoinSet::new();
  let mut task_ids = HashMap::new();

  for (task, pipeline) in pipelines {
    let engine = engine.clone();
    let semaphore = semaphore.clone();

    let handle = join_set.spawn(async move {
      let (result, duration_ms) = match semaphore.acquire().await {
        Ok(_permit) => {
          debug!(task = %task, "task started");
          let started = Instant::now();
          let result = engine.stdout(pipeline).await;
          (result, started.elapsed().as_millis())
        }
        Err(e) => (Err(EngineError::Io(std::io::Error::other(e))), 0),
      };
      TaskOutcome {
        task,
        duration_ms,
        result,
      }
    });
    task_ids.insert(handle.id(), task);
  }

  let deadline = async {
    match config.timeout {
      Some(timeout) => tokio::time::sleep(timeout).await,
      None => std::future::pending().await,
    }
  };
  tokio::pin!(deadline);

  let mut outcomes = Vec::with_capacity(task_ids.len());
  loop {
    tokio::select! {
      joined = join_set.join_next() => match joined {
        None => break,
        Some(Ok(outcome)) => {
          match &outcome.result {
            Ok(_) => info!(task = %outcome.task, duration_ms = outcome.duration_ms, "task succeeded"),
            Err(e) => error!(task = %outcome.task, error = %e, "task failed"),
          }
          outcomes.push(outcome);
        }
        Some(Err(e)) => {
          let Some(task) = task_ids.get(&e.id()).copied() else {
            error!(error = %e, "unknown CI task panicked");
            continue;
          };
          error!(task = %task, error = %e, "task panicked");
          outcomes.push(TaskOutcome {
            task,
            duration_ms: 0,
            result: Err(EngineError::Io(std::io::Error::other(e))),
          });
        }
      },
      _ = cancel.cancelled() => {
        warn!(in_flight = join_set.len(), "CI run cancelled, aborting tasks");
        abort_all(join_set).await;
        return Err(CiError::Cancelled);
      }
      _ = &mut deadline => {
        warn!(in_flight = join_set.len(), "CI run timed out, aborting tasks");
        abort_all(join_set).await;
        return Err(CiError::TimedOut {
          timeout: config.timeout.unwrap_or_default(),
        });
      }
    }
  }

  aggregate(config, outcomes)
}

/// Abort every task and wait until all of them are gone.
async fn abort_all<T: 'static>(mut join_set: JoinSet<T>) {
  join_set.abort_all();
  while join_set.join_next().await.is_some() {}
}

fn aggregate(config: &CiConfig, mut outcomes: Vec<TaskOutcome>) -> Result<CiReport, CiError> {
  // Report in configuration order, not completion order.
  outcomes.sort_by_key(|o| config.tasks.iter().position(|t| *t == o.task));

  let total = outcomes.len();
  let mut failures = Vec::new();
  let mut summaries = Vec::new();
  for outcome in outcomes {
    match outcome.result {
      Ok(stdout) => summaries.push(TaskSummary {
        task: outcome.task,
        duration_ms: outcome.duration_ms,
        stdout,
      }),
      Err(error) => failures.push(TaskFailure {
        task: outcome.task,
        error,
      }),
    }
  }

  if !failures.is_empty() {
    return Err(CiError::AggregateFailure {
      failures,
      succeeded: summaries.iter().map(|s| s.task).collect(),
      total,
    });
  }

  info!(tasks = total, "CI run succeeded");
  Ok(CiReport::new(summaries))
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use tracing_test::traced_test;

  use super::*;
  use crate::cache::VolumeRegistry;
  use crate::engine::FakeEngine;
  use crate::platform::Platform;
  use crate::source::SourceTree;
  use crate::util::testutil::{monorepo, monorepo_without};

  #[tokio::test]
  async fn all_tasks_succeed() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new());

    let report = run_ci(
      engine.clone(),
      &BuildContext::new(&tree, &volumes),
      &CiConfig::default(),
      CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.message, "CI pipeline completed successfully");
    assert_eq!(
      report.tasks.iter().map(|t| t.task).collect::<Vec<_>>(),
      CiTask::DEFAULT.to_vec()
    );
    assert_eq!(engine.total_calls(), 5);
  }

  #[tokio::test]
  async fn one_failure_fails_the_run_after_all_tasks_ran() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new().failing("test-central"));

    let err = run_ci(
      engine.clone(),
      &BuildContext::new(&tree, &volumes),
      &CiConfig::default(),
      CancellationToken::new(),
    )
    .await
    .unwrap_err();

    match err {
      CiError::AggregateFailure {
        failures,
        succeeded,
        total,
      } => {
        assert_eq!(total, 5);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].task, CiTask::TestCentral);
        assert_eq!(succeeded.len(), 4);
      }
      other => panic!("unexpected error: {other}"),
    }
    for task in CiTask::DEFAULT {
      assert_eq!(engine.calls(task.as_str()), 1, "{task} was not attempted");
    }
  }

  #[tokio::test]
  #[traced_test]
  async fn each_failed_task_is_logged() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new().failing("build-app"));

    let result = run_ci(
      engine,
      &BuildContext::new(&tree, &volumes),
      &CiConfig::default(),
      CancellationToken::new(),
    )
    .await;

    assert!(result.is_err());
    assert!(logs_contain("task failed"));
    assert!(logs_contain("task=build-app"));
  }

  #[tokio::test]
  async fn projection_error_fails_before_any_evaluation() {
    let temp = monorepo_without("edge-protocol");
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new());
    let config = CiConfig {
      platform: Platform::LinuxArm64,
      ..CiConfig::default()
    };

    let err = run_ci(
      engine.clone(),
      &BuildContext::new(&tree, &volumes),
      &config,
      CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
      err,
      CiError::Build {
        task: CiTask::BuildPeripheral,
        ..
      }
    ));
    assert_eq!(engine.total_calls(), 0);
  }

  #[tokio::test]
  async fn cancellation_aborts_in_flight_tasks() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new().with_delay(Duration::from_secs(60)));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      trigger.cancel();
    });

    let err = run_ci(engine.clone(), &BuildContext::new(&tree, &volumes), &CiConfig::default(), cancel)
      .await
      .unwrap_err();
    assert!(matches!(err, CiError::Cancelled));

    // Every task started, and all of them were dropped before returning.
    assert_eq!(engine.total_calls(), CiTask::DEFAULT.len());
    assert_eq!(engine.in_flight(), 0);
    assert_eq!(engine.finished(), 0);
  }

  #[tokio::test]
  async fn aborted_tasks_never_finish_their_evaluation() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new().with_delay(Duration::from_millis(200)));
    let config = CiConfig {
      timeout: Some(Duration::from_millis(20)),
      ..CiConfig::default()
    };

    let err = run_ci(engine.clone(), &BuildContext::new(&tree, &volumes), &config, CancellationToken::new())
      .await
      .unwrap_err();
    assert!(matches!(err, CiError::TimedOut { .. }));
    assert_eq!(engine.in_flight(), 0);

    // Well past the point where the evaluations would have completed.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(engine.finished(), 0);
  }

  #[tokio::test]
  async fn timeout_aborts_the_run() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new().with_delay(Duration::from_secs(60)));
    let config = CiConfig {
      timeout: Some(Duration::from_millis(20)),
      ..CiConfig::default()
    };

    let err = run_ci(engine, &BuildContext::new(&tree, &volumes), &config, CancellationToken::new())
      .await
      .unwrap_err();
    assert!(matches!(err, CiError::TimedOut { .. }));
  }

  #[tokio::test]
  async fn parallelism_one_still_runs_everything() {
    let temp = monorepo();
    let tree = SourceTree::new(temp.path()).unwrap();
    let volumes = VolumeRegistry::new();
    let engine = Arc::new(FakeEngine::new());
    let config = CiConfig {
      parallelism: 1,
      ..CiConfig::default()
    };

    run_ci(engine.clone(), &BuildContext::new(&tree, &volumes), &config, CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(engine.total_calls(), 5);
  }
}
