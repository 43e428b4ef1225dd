mod ci;
mod info;
mod plan;
mod run;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use myco_lib::config::MycoConfig;
use myco_lib::engine::DockerEngine;
use myco_lib::ops::Orchestrator;
use myco_lib::source::SourceTree;

pub use ci::cmd_ci;
pub use info::cmd_info;
pub use plan::cmd_plan;
pub use run::cmd_run;

/// Everything a command needs before it touches the engine.
pub struct Session {
  pub config: MycoConfig,
  pub tree: SourceTree,
}

impl Session {
  /// Resolve config and checkout from the global flags.
  ///
  /// `--source` wins over `source_root` in the config, which wins over the
  /// working directory.
  pub fn load(config: Option<&Path>, source: Option<&Path>) -> Result<Self> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let search_root = source.map(Path::to_path_buf).unwrap_or_else(|| cwd.clone());

    let config = match config {
      Some(path) => MycoConfig::load(path).with_context(|| format!("Failed to load config: {}", path.display()))?,
      None => MycoConfig::discover(&search_root).context("Failed to load config")?,
    };

    let root = source
      .map(Path::to_path_buf)
      .or_else(|| config.source_root.clone())
      .unwrap_or(cwd);
    let ignore = config.ignore_set().context("Invalid ignore globs")?;
    let tree = SourceTree::new(&root)
      .with_context(|| format!("Failed to open checkout: {}", root.display()))?
      .with_ignore(ignore);

    debug!(root = %tree.root().display(), "opened checkout");
    Ok(Self { config, tree })
  }

  pub fn orchestrator(&self, cancel: CancellationToken) -> Orchestrator {
    let engine = Arc::new(DockerEngine::from_config(&self.config.engine));
    Orchestrator::new(engine, self.tree.clone(), self.config.clone()).with_cancel(cancel)
  }
}

/// A runtime whose token is cancelled on Ctrl-C.
pub fn interruptible_runtime() -> Result<(Runtime, CancellationToken)> {
  let rt = Runtime::new().context("Failed to create async runtime")?;
  let cancel = CancellationToken::new();

  let token = cancel.clone();
  rt.spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, stopping running pipelines");
      token.cancel();
    }
  });

  Ok((rt, cancel))
}
