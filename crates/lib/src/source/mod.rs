//! Source projection.
//!
//! Each component's pipeline sees only the part of the checkout its build
//! depends on, so edits elsewhere in the monorepo leave its cache key alone.
//! A projection is a pure function of the tree content and the glob list.

pub mod ignore;
pub mod project;
pub mod types;

pub use ignore::{DEFAULT_IGNORED_NAMES, IgnoreSet};
pub use project::project;
pub use types::{ProjectionError, SourceEntry, SourceGlobs, SourceSubset, SourceTree};
