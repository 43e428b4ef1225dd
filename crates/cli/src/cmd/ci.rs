//! Implementation of the `myco ci` command.
//!
//! Runs every configured task, then prints one line per task. A failed run
//! still lists the tasks that succeeded before exiting non-zero.

use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use myco_lib::ci::CiError;
use myco_lib::ops::{Operation, OperationOutput, OpsError};

use super::{Session, interruptible_runtime};
use crate::output::{OutputFormat, format_elapsed, print_diagnostics, print_json, print_success, print_task_line};

pub fn cmd_ci(session: &Session, op: Operation, format: OutputFormat) -> Result<()> {
  let (rt, cancel) = interruptible_runtime()?;
  let orchestrator = session.orchestrator(cancel);

  // The CI run handles cancellation itself so in-flight tasks are drained.
  let result = rt.block_on(orchestrator.run(op));

  match &result {
    Ok(OperationOutput::Ci(report)) => {
      if format.is_json() {
        print_json(report)?;
      } else {
        for task in &report.tasks {
          let duration = Duration::from_millis(task.duration_ms as u64);
          print_task_line(true, task.task.as_str(), &format_elapsed(duration));
        }
        println!();
        print_success(&report.message);
      }
    }
    Err(OpsError::Ci(CiError::AggregateFailure {
      failures, succeeded, ..
    })) => {
      if format.is_json() {
        let failed: Vec<_> = failures
          .iter()
          .map(|f| json!({ "task": f.task, "error": f.error.to_string(), "output": f.error.output() }))
          .collect();
        print_json(&json!({ "succeeded": succeeded, "failed": failed }))?;
      } else {
        for task in succeeded {
          print_task_line(true, task.as_str(), "ok");
        }
        for failure in failures {
          print_task_line(false, failure.task.as_str(), &failure.error.to_string());
          if let Some(output) = failure.error.output() {
            print_diagnostics(output);
          }
        }
        println!();
      }
    }
    _ => {}
  }

  result?;
  Ok(())
}
