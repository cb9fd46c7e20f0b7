//! # segtable testkit
//!
//! Test utilities for segtable.
//!
//! This crate provides:
//! - Drop accounting fixtures for leak and double-drop checks
//! - Property-based test generators using proptest
//! - Multi-threaded stress runners that verify what they pop
//!
//! ## Usage
//!
//! ```rust
//! use segtable_testkit::prelude::*;
//!
//! let config = StressConfig {
//!     operations: 2_000,
//!     threads: 2,
//!     ..StressConfig::default()
//! };
//! let result = stress_queue_mpmc(&config);
//! assert!(result.verified);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
