//! myco-lib: build orchestration core for the Mycelium monorepo
//!
//! This crate provides the pieces that describe, cache, execute and publish
//! containerized build pipelines:
//! - `source`: projects the checkout onto the minimal subset each component needs
//! - `cache`: process-wide registry of named cache volumes
//! - `pipeline`: immutable, hashable descriptions of container state transitions
//! - `builders`: one pure pipeline builder per component
//! - `engine`: the evaluation seam (docker/buildkit, plus a fake for tests)
//! - `matrix`: multi-architecture assembly of the backend image
//! - `ci`: the concurrent aggregate CI entrypoint
//! - `ops`: the registered command table dispatched by the CLI

pub mod builders;
pub mod cache;
pub mod ci;
pub mod component;
pub mod config;
pub mod consts;
pub mod engine;
pub mod matrix;
pub mod ops;
pub mod pipeline;
pub mod platform;
pub mod source;
pub mod util;
