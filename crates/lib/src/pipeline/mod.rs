//! Pipeline descriptions.
//!
//! A pipeline is an immutable, structurally comparable list of container
//! state transitions on top of a base image. Descriptions are built by the
//! component builders and evaluated lazily by an engine.

pub mod description;
pub mod result;
pub mod types;

pub use description::PipelineDescription;
pub use result::{BuildResult, ContainerImage, DirectoryArtifact, FileArtifact};
pub use types::{ArtifactRef, ImageRef, PinnedPackage, RefError, SecretRef, Transition};
