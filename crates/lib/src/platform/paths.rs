//! Per-user locations, following the XDG base directory layout.

use std::env;
use std::path::PathBuf;

use crate::consts::{APP_NAME, CACHE_DIR_ENV};

/// The user's home directory, or the working directory when `HOME` is unset.
pub fn home_dir() -> PathBuf {
  env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

/// `$<var>/myco`, or `~/<fallback>/myco` when the variable is unset.
fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
  env::var_os(var)
    .map(PathBuf::from)
    .unwrap_or_else(|| home_dir().join(fallback))
    .join(APP_NAME)
}

/// Where the user-level `myco.toml` is looked up.
pub fn config_dir() -> PathBuf {
  xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// Build contexts and exported artifacts of the docker engine.
///
/// `MYCO_CACHE_DIR` replaces the XDG location entirely.
pub fn cache_dir() -> PathBuf {
  match env::var_os(CACHE_DIR_ENV) {
    Some(dir) => PathBuf::from(dir),
    None => xdg_dir("XDG_CACHE_HOME", ".cache"),
  }
}
