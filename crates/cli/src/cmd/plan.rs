//! Implementation of the `myco plan` command.
//!
//! Describes the pipelines a command would evaluate and prints their cache
//! keys. Nothing is sent to the engine, so this works without docker.

use anyhow::{Context, Result};

use myco_lib::ops::Operation;

use super::Session;
use crate::output::{OutputFormat, print_field, print_info, print_json, print_pipeline_header};

pub fn cmd_plan(session: &Session, op: Operation, verbose: bool, format: OutputFormat) -> Result<()> {
  let orchestrator = session.orchestrator(Default::default());
  let plan = orchestrator
    .plan(&op)
    .with_context(|| format!("Failed to describe {}", op.name()))?;

  if format.is_json() {
    return print_json(&plan);
  }

  print_info(&format!("{}: {} pipeline(s)", op.name(), plan.len()));
  for pipeline in &plan {
    println!();
    print_pipeline_header(&pipeline.name, &pipeline.cache_key.0);
    print_field("Image", &pipeline.base_image);
    if let Some(platform) = pipeline.platform {
      print_field("Platform", platform.as_str());
    }
    print_field("Steps", &pipeline.steps.len().to_string());

    if verbose {
      for step in &pipeline.steps {
        println!("    {}", step);
      }
    }
  }

  Ok(())
}
