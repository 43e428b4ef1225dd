//! Single-command execution: component builds, publish and client generation.

use anyhow::{Result, anyhow};

use myco_lib::ops::{Operation, OperationOutput};

use super::{Session, interruptible_runtime};
use crate::output::{OutputFormat, print_field, print_json, print_success, short_digest};

pub fn cmd_run(session: &Session, op: Operation, format: OutputFormat) -> Result<()> {
  let (rt, cancel) = interruptible_runtime()?;
  let orchestrator = session.orchestrator(cancel.clone());
  let name = op.name();

  // Dropping the run future kills the engine's child processes.
  let output = rt.block_on(async {
    tokio::select! {
      result = orchestrator.run(op) => result.map_err(anyhow::Error::from),
      _ = cancel.cancelled() => Err(anyhow!("{} interrupted", name)),
    }
  })?;

  if format.is_json() {
    return print_json(&output);
  }

  match output {
    OperationOutput::Stdout { pipeline, stdout } => {
      if !stdout.is_empty() {
        print!("{}", stdout);
      }
      print_success(&format!("{} completed", pipeline));
    }
    OperationOutput::Published(receipt) => {
      print_success(&format!("Published {}", receipt.address));
      print_field("Assembly", short_digest(&receipt.jar.digest.0));
      for image in &receipt.images {
        print_field(image.platform.as_str(), &image.locator);
      }
    }
    OperationOutput::Client(dir) => {
      print_success(&format!("Client written to {}", dir.host_path.display()));
      print_field("Files", &dir.files.to_string());
    }
    OperationOutput::Ci(report) => print_success(&report.message),
  }

  Ok(())
}
