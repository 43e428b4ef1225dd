//! The global ignore set applied to every component's view of the tree.

use std::path::Path;

use glob::Pattern;

use super::types::ProjectionError;

/// Path components hidden from every component: VCS metadata, dependency
/// caches, build outputs, editor state and local secrets.
pub const DEFAULT_IGNORED_NAMES: &[&str] = &[
  "node_modules",
  ".git",
  ".github",
  ".husky",
  ".vscode",
  // rust
  "target",
  "artifact",
  // browser
  ".swc",
  ".netlify",
  // e2e
  "test-results",
  "template-tests",
  "playwright-report",
  "tmp",
  ".temp",
  ".DS_Store",
  "dist",
  "assets_tmp",
  "build",
  // secrets
  ".env",
  ".envrc",
];

/// Names matched against any path component plus extra globs matched against
/// the whole relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreSet {
  names: Vec<String>,
  patterns: Vec<Pattern>,
}

impl Default for IgnoreSet {
  fn default() -> Self {
    Self {
      names: DEFAULT_IGNORED_NAMES.iter().map(|s| s.to_string()).collect(),
      patterns: Vec::new(),
    }
  }
}

impl IgnoreSet {
  /// An ignore set that hides nothing.
  pub fn empty() -> Self {
    Self {
      names: Vec::new(),
      patterns: Vec::new(),
    }
  }

  /// Add whole-path globs (e.g. `docs/**/*.png`) on top of the name set.
  pub fn with_globs<I, S>(mut self, globs: I) -> Result<Self, ProjectionError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    for glob in globs {
      let pattern = super::project::compile_pattern(&glob.into())?;
      self.patterns.push(pattern);
    }
    Ok(self)
  }

  /// Whether a path relative to the tree root is hidden.
  pub fn is_ignored(&self, relative: &Path) -> bool {
    let by_name = relative.components().any(|c| {
      c.as_os_str()
        .to_str()
        .is_some_and(|name| self.names.iter().any(|n| n == name))
    });
    if by_name {
      return true;
    }

    let rel = super::project::to_slash(relative);
    self
      .patterns
      .iter()
      .any(|p| p.matches_with(&rel, super::project::MATCH_OPTIONS))
  }
}
