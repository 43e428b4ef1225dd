//! Test utilities for myco-lib.
//!
//! Builds throwaway monorepo checkouts with the layout the component
//! builders expect.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// Write `content` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) {
  let path = root.join(relative);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(&path, content).unwrap();
}

/// Files of a minimal but complete Mycelium checkout.
pub const MONOREPO_FILES: &[(&str, &str)] = &[
  ("backend/build.sbt", "name := \"backend\"\n"),
  ("backend/project/build.properties", "sbt.version=1.11.3\n"),
  ("backend/project/plugins.sbt", "addSbtPlugin(\"com.eed3si9n\" % \"sbt-assembly\" % \"2.3.0\")\n"),
  ("backend/src/main/scala/co/mycelium/Main.scala", "object Main\n"),
  ("backend/src/test/scala/co/mycelium/MainSpec.scala", "class MainSpec\n"),
  ("backend/native-image/reflect-config.json", "[]\n"),
  ("app/package.json", "{\"name\":\"app\"}\n"),
  ("app/package-lock.json", "{}\n"),
  ("app/src/main.tsx", "export {}\n"),
  ("app/src-tauri/Cargo.toml", "[package]\nname = \"app\"\n"),
  ("app/src-tauri/src/main.rs", "fn main() {}\n"),
  ("edge-central/Cargo.toml", "[package]\nname = \"edge-central\"\n"),
  ("edge-central/src/bin/main.rs", "fn main() {}\n"),
  ("current-time/Cargo.toml", "[package]\nname = \"current-time\"\n"),
  ("current-time/src/lib.rs", "\n"),
  ("edge-protocol/Cargo.toml", "[package]\nname = \"edge-protocol\"\n"),
  ("edge-protocol/src/lib.rs", "\n"),
  ("edge-peripheral/Cargo.toml", "[package]\nname = \"edge-peripheral\"\n"),
  ("edge-peripheral/src/main.rs", "fn main() {}\n"),
];

/// Noise that the global ignore set must hide from every component.
pub const IGNORED_FILES: &[(&str, &str)] = &[
  (".git/HEAD", "ref: refs/heads/main\n"),
  ("app/node_modules/react/index.js", "module.exports = {}\n"),
  ("backend/target/scala-2.13/classes/Main.class", "cafebabe"),
  ("edge-central/target/release/edge-central", "elf"),
  (".env", "SECRET=1\n"),
];

/// Create a temporary checkout containing `MONOREPO_FILES` and `IGNORED_FILES`.
pub fn monorepo() -> TempDir {
  let temp = TempDir::new().unwrap();
  for (path, content) in MONOREPO_FILES.iter().chain(IGNORED_FILES) {
    write_file(temp.path(), path, content);
  }
  temp
}

/// Like `monorepo`, but without the given directory.
pub fn monorepo_without(dir: &str) -> TempDir {
  let temp = monorepo();
  fs::remove_dir_all(temp.path().join(dir)).unwrap();
  temp
}
