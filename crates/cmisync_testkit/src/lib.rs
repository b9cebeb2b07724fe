//! # cmisync Testkit
//!
//! Test utilities for cmisync.
//!
//! This crate provides:
//! - Offline stores on in-memory or temporary SQLite backends with a
//!   manual clock
//! - Builders for user data and activities
//! - Mock remote seeding and a ready-made sync harness
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cmisync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn syncs_offline_attempt() {
//!     let harness = SyncHarness::new(activity(10, 1));
//!     harness.offline_attempt(1, "completed");
//!     harness.engine.sync_activity(&harness.activity).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
