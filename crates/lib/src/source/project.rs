//! Projection of a checkout onto one component's allow-list.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::types::{ProjectionError, SourceEntry, SourceGlobs, SourceSubset, SourceTree};
use crate::util::hash::hash_file;

pub(crate) const MATCH_OPTIONS: MatchOptions = MatchOptions {
  case_sensitive: true,
  require_literal_separator: true,
  require_literal_leading_dot: false,
};

/// Compile a glob, treating a trailing `**` as "everything below".
pub(crate) fn compile_pattern(glob: &str) -> Result<Pattern, ProjectionError> {
  let normalized = if glob == "**" || glob.ends_with("/**") {
    format!("{}/*", glob)
  } else {
    glob.to_string()
  };
  Pattern::new(&normalized).map_err(|e| ProjectionError::InvalidPattern {
    pattern: glob.to_string(),
    message: e.msg.to_string(),
  })
}

/// Render a relative path with `/` separators regardless of host.
pub(crate) fn to_slash(path: &Path) -> String {
  path
    .components()
    .filter_map(|c| match c {
      Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
      _ => None,
    })
    .collect::<Vec<_>>()
    .join("/")
}

/// Project `tree` onto the allow-list in `globs`.
///
/// The global ignore set is applied first, then only paths matching at least
/// one include glob are kept. Symlinks are never followed; a symlink is kept
/// only when its target resolves to a file or directory of the same subset.
///
/// Required paths are checked before unmatched globs so a missing sibling
/// crate is reported as such rather than as an empty pattern.
pub fn project(tree: &SourceTree, globs: &SourceGlobs) -> Result<SourceSubset, ProjectionError> {
  let root = tree.root();
  let patterns = globs
    .include
    .iter()
    .map(|g| compile_pattern(g))
    .collect::<Result<Vec<_>, _>>()?;
  let mut matched = vec![false; patterns.len()];
  let mut entries = BTreeMap::new();
  let mut links = Vec::new();

  let walker = WalkDir::new(root)
    .follow_links(false)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.depth() == 0 || !tree.ignore().is_ignored(e.path().strip_prefix(root).unwrap_or(e.path())));

  for entry in walker {
    let entry = entry.map_err(|e| ProjectionError::Walk { message: e.to_string() })?;
    let file_type = entry.file_type();
    if file_type.is_dir() {
      continue;
    }

    let rel = to_slash(entry.path().strip_prefix(root).unwrap_or(entry.path()));
    let hits: Vec<usize> = patterns
      .iter()
      .enumerate()
      .filter(|(_, p)| p.matches_with(&rel, MATCH_OPTIONS))
      .map(|(i, _)| i)
      .collect();
    if hits.is_empty() {
      continue;
    }

    if file_type.is_symlink() {
      match symlink_in_tree(root, entry.path()) {
        Some(link) => links.push((rel, link, hits)),
        None => warn!(path = %rel, "skipping symlink that leaves the source tree"),
      }
      continue;
    }
    if !file_type.is_file() {
      continue;
    }
    let source_entry = SourceEntry::File {
      digest: hash_file(entry.path())?,
      executable: is_executable(&entry),
    };

    for i in hits {
      matched[i] = true;
    }
    entries.insert(rel, source_entry);
  }

  // Links are resolved once every regular file is known.
  for (rel, link, hits) in links {
    let prefix = format!("{}/", link.resolved);
    if !entries.contains_key(&link.resolved) && !entries.keys().any(|k| k.starts_with(&prefix)) {
      warn!(path = %rel, target = %link.resolved, "skipping symlink whose target is not in the subset");
      continue;
    }
    for i in hits {
      matched[i] = true;
    }
    entries.insert(rel, SourceEntry::Symlink { target: link.text });
  }

  for required in &globs.required {
    let prefix = format!("{}/", required.trim_end_matches('/'));
    let present = entries.contains_key(required) || entries.keys().any(|k| k.starts_with(&prefix));
    if !present {
      return Err(ProjectionError::MissingPath { path: required.clone() });
    }
  }

  for (pattern, hit) in globs.include.iter().zip(&matched) {
    if !hit {
      return Err(ProjectionError::NoMatch {
        pattern: pattern.clone(),
      });
    }
  }

  debug!(files = entries.len(), root = %root.display(), "projected source subset");

  Ok(SourceSubset {
    root: root.to_path_buf(),
    globs: globs.clone(),
    entries,
  })
}

/// An in-tree symlink: its link text and the tree-relative path it resolves to.
struct InTreeLink {
  text: String,
  resolved: String,
}

/// Read `link`, if it resolves to a path inside `root`.
fn symlink_in_tree(root: &Path, link: &Path) -> Option<InTreeLink> {
  let target = std::fs::read_link(link).ok()?;
  let canonical = dunce::canonicalize(link.parent().unwrap_or(root).join(&target)).ok()?;
  let relative = canonical.strip_prefix(root).ok()?;
  Some(InTreeLink {
    text: target.to_string_lossy().into_owned(),
    resolved: to_slash(relative),
  })
}

#[cfg(unix)]
fn is_executable(entry: &walkdir::DirEntry) -> bool {
  use std::os::unix::fs::PermissionsExt;
  entry
    .metadata()
    .map(|m| m.permissions().mode() & 0o111 != 0)
    .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_entry: &walkdir::DirEntry) -> bool {
  false
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{monorepo, write_file};
  use tempfile::TempDir;

  fn tree(temp: &TempDir) -> SourceTree {
    SourceTree::new(temp.path()).unwrap()
  }

  #[test]
  fn allow_list_keeps_only_matching_files() {
    let temp = monorepo();
    let subset = project(&tree(&temp), &SourceGlobs::new(["edge-protocol/**"])).unwrap();

    let paths: Vec<&str> = subset.paths().collect();
    assert_eq!(paths, vec!["edge-protocol/Cargo.toml", "edge-protocol/src/lib.rs"]);
  }

  #[test]
  fn global_ignore_applies_before_allow_list() {
    let temp = monorepo();
    let subset = project(&tree(&temp), &SourceGlobs::new(["app/**", "backend/**"])).unwrap();

    assert!(subset.contains("app/package.json"));
    assert!(!subset.paths().any(|p| p.contains("node_modules")));
    assert!(!subset.paths().any(|p| p.starts_with("backend/target")));
  }

  #[test]
  fn projection_is_deterministic() {
    let temp = monorepo();
    let globs = SourceGlobs::new(["backend/**", "edge-protocol/**"]);

    let first = project(&tree(&temp), &globs).unwrap();
    let second = project(&tree(&temp), &globs).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.digest(), second.digest());
    assert_eq!(
      serde_json::to_string(&first).unwrap(),
      serde_json::to_string(&second).unwrap()
    );
  }

  #[test]
  fn unrelated_changes_do_not_change_digest() {
    let temp = monorepo();
    let globs = SourceGlobs::new(["edge-central/**"]);
    let before = project(&tree(&temp), &globs).unwrap().digest();

    write_file(temp.path(), "app/src/main.tsx", "export const changed = true\n");
    let after = project(&tree(&temp), &globs).unwrap().digest();

    assert_eq!(before, after);
  }

  #[test]
  fn content_changes_change_digest() {
    let temp = monorepo();
    let globs = SourceGlobs::new(["edge-central/**"]);
    let before = project(&tree(&temp), &globs).unwrap().digest();

    write_file(temp.path(), "edge-central/src/bin/main.rs", "fn main() { todo!() }\n");
    let after = project(&tree(&temp), &globs).unwrap().digest();

    assert_ne!(before, after);
  }

  #[test]
  fn relocated_checkout_projects_equal_subset() {
    let a = monorepo();
    let b = monorepo();
    let globs = SourceGlobs::new(["edge-protocol/**"]);

    let left = project(&tree(&a), &globs).unwrap();
    let right = project(&tree(&b), &globs).unwrap();

    assert_eq!(left, right);
    assert_eq!(left.digest(), right.digest());
  }

  #[test]
  fn unmatched_glob_is_an_error() {
    let temp = monorepo();
    let err = project(&tree(&temp), &SourceGlobs::new(["firmware/**"])).unwrap_err();
    assert!(matches!(err, ProjectionError::NoMatch { pattern } if pattern == "firmware/**"));
  }

  #[test]
  fn missing_required_path_is_reported_first() {
    let temp = monorepo();
    std::fs::remove_dir_all(temp.path().join("edge-protocol")).unwrap();

    let globs = SourceGlobs::new(["edge-peripheral/**", "edge-protocol/**"]).with_required(["edge-protocol"]);
    let err = project(&tree(&temp), &globs).unwrap_err();

    assert!(matches!(err, ProjectionError::MissingPath { path } if path == "edge-protocol"));
  }

  #[test]
  fn invalid_glob_is_rejected() {
    let temp = monorepo();
    let err = project(&tree(&temp), &SourceGlobs::new(["app/[oops"])).unwrap_err();
    assert!(matches!(err, ProjectionError::InvalidPattern { .. }));
  }

  #[test]
  fn single_star_does_not_cross_directories() {
    let temp = monorepo();
    let subset = project(&tree(&temp), &SourceGlobs::new(["backend/*.sbt"])).unwrap();
    let paths: Vec<&str> = subset.paths().collect();
    assert_eq!(paths, vec!["backend/build.sbt"]);
  }

  #[cfg(unix)]
  #[test]
  fn symlinks_leaving_the_tree_are_excluded() {
    let temp = monorepo();
    let outside = TempDir::new().unwrap();
    write_file(outside.path(), "secret.txt", "nope");
    std::os::unix::fs::symlink(outside.path().join("secret.txt"), temp.path().join("app/leak.txt")).unwrap();
    std::os::unix::fs::symlink("package.json", temp.path().join("app/alias.json")).unwrap();

    let subset = project(&tree(&temp), &SourceGlobs::new(["app/**"])).unwrap();

    assert!(!subset.contains("app/leak.txt"));
    assert_eq!(
      subset.entries().get("app/alias.json"),
      Some(&SourceEntry::Symlink {
        target: "package.json".to_string()
      })
    );
  }

  #[cfg(unix)]
  #[test]
  fn symlinks_to_files_outside_the_subset_are_excluded() {
    let temp = monorepo();
    write_file(temp.path(), ".env", "DATABASE_PASSWORD=hunter2\n");
    write_file(temp.path(), "backend/build.sbt", "name := \"backend\"\n");
    std::os::unix::fs::symlink("../.env", temp.path().join("app/.env")).unwrap();
    std::os::unix::fs::symlink("../backend/build.sbt", temp.path().join("app/build.sbt")).unwrap();
    std::os::unix::fs::symlink("src", temp.path().join("app/source")).unwrap();

    let subset = project(&tree(&temp), &SourceGlobs::new(["app/**"])).unwrap();

    assert!(!subset.contains("app/.env"));
    assert!(!subset.contains("app/build.sbt"));
    assert_eq!(
      subset.entries().get("app/source"),
      Some(&SourceEntry::Symlink { target: "src".to_string() })
    );
  }

  #[test]
  fn materialize_copies_projected_files_only() {
    let temp = monorepo();
    let subset = project(&tree(&temp), &SourceGlobs::new(["edge-central/**"])).unwrap();
    let dest = TempDir::new().unwrap();

    subset.materialize(dest.path()).unwrap();

    assert!(dest.path().join("edge-central/Cargo.toml").is_file());
    assert!(!dest.path().join("edge-central/target").exists());
    assert!(!dest.path().join("app").exists());
  }

  #[test]
  fn missing_root_is_not_a_directory() {
    let err = SourceTree::new("/definitely/not/here").unwrap_err();
    assert!(matches!(err, ProjectionError::NotADirectory { .. }));
  }
}
