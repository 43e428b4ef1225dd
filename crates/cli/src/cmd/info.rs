use anyhow::Result;
use serde_json::json;

use myco_lib::ops::Operation;
use myco_lib::platform::Platform;

use super::Session;
use crate::output::{OutputFormat, print_field, print_json};

pub fn cmd_info(session: &Session, format: OutputFormat) -> Result<()> {
  let host = Platform::host();
  let config = &session.config;

  if format.is_json() {
    return print_json(&json!({
      "version": env!("CARGO_PKG_VERSION"),
      "host_platform": host,
      "source_root": session.tree.root(),
      "state_dir": config.engine.resolved_state_dir(),
      "docker": config.engine.docker_bin,
      "commands": Operation::NAMES,
      "publish_platforms": config.publish.platforms,
      "ci_tasks": config.ci.tasks,
    }));
  }

  println!("myco {}", env!("CARGO_PKG_VERSION"));
  println!();
  match host {
    Some(platform) => print_field("Host platform", platform.as_str()),
    None => print_field("Host platform", "unsupported"),
  }
  print_field("Source root", &session.tree.root().display().to_string());
  print_field("State dir", &config.engine.resolved_state_dir().display().to_string());
  print_field("Docker", &config.engine.docker_bin);
  print_field(
    "Publishes",
    &config
      .publish
      .platforms
      .iter()
      .map(|p| p.as_str())
      .collect::<Vec<_>>()
      .join(", "),
  );
  print_field(
    "CI tasks",
    &config.ci.tasks.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", "),
  );
  println!();
  println!("Commands:");
  for name in Operation::NAMES {
    println!("  {}", name);
  }

  Ok(())
}
