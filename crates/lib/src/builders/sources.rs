//! Per-component source allow-lists.
//!
//! These are versioned together with the builders: a glob added here changes
//! which edits invalidate the component's cache.

use crate::source::SourceGlobs;

/// sbt build definition and sources. Generated directories (`target`,
/// `project/target`) never match, and the native-image configuration belongs
/// to [`backend_native`].
pub fn backend() -> SourceGlobs {
  SourceGlobs::new([
    "backend/build.sbt",
    "backend/project/*.sbt",
    "backend/project/build.properties",
    "backend/src/**",
  ])
  .with_required(["backend/build.sbt", "backend/project/build.properties"])
}

/// Reflection configuration consumed by the native-image compiler.
pub fn backend_native() -> SourceGlobs {
  SourceGlobs::new(["backend/native-image/**"]).with_required(["backend/native-image/reflect-config.json"])
}

pub fn app() -> SourceGlobs {
  SourceGlobs::new(["app/**"]).with_required(["app/package.json", "app/package-lock.json", "app/src-tauri/Cargo.toml"])
}

pub fn central() -> SourceGlobs {
  SourceGlobs::new(["edge-central/**"]).with_required(["edge-central/Cargo.toml"])
}

/// Sibling crate the central daemon depends on by relative path.
pub fn current_time() -> SourceGlobs {
  SourceGlobs::new(["current-time/**"]).with_required(["current-time/Cargo.toml"])
}

/// Protocol definitions shared by the daemon and the firmware.
pub fn protocol() -> SourceGlobs {
  SourceGlobs::new(["edge-protocol/**"]).with_required(["edge-protocol/Cargo.toml"])
}

pub fn peripheral() -> SourceGlobs {
  SourceGlobs::new(["edge-peripheral/**"]).with_required(["edge-peripheral/Cargo.toml"])
}
