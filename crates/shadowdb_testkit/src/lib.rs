//! # ShadowDB Testkit
//!
//! Test utilities for ShadowDB.
//!
//! This crate provides:
//! - Test environments over in-memory or temp-file SQLite
//! - Property-based test generators using proptest
//! - An integration harness that tracks expected shadow contents
//!
//! ## Usage
//!
//! ```rust
//! use shadowdb_testkit::prelude::*;
//!
//! with_env(|env| {
//!     env.seed(1, "post", &[("color", "red")]);
//!     assert_eq!(env.migrate("post"), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
