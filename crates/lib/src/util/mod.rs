//! Shared utilities.
//!
//! Common utilities used across the crate: hashing and test helpers.

pub mod hash;

#[cfg(any(test, feature = "test-support"))]
pub mod testutil;
