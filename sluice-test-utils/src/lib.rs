// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Test sources and assertion helpers for the Sluice cursor library.
//!
//! Designed for development and testing only, not for production code.
//!
//! # Sources
//!
//! - [`scripted_source`]: replays a [`Step`] script of values, errors, delays and stalls,
//! - [`delayed_source`], [`failing_source`], [`pending_source`]: common scripts,
//! - [`CountingSource`]: wraps any source and records opens, advances, closes and drops.
//!
//! # Assertions
//!
//! ```rust
//! use sluice_core::{AsyncSource, CancellationToken};
//! use sluice_test_utils::{expect_end, expect_next, scripted_source, Step};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cursor = scripted_source(vec![Step::Value(1), Step::delay_ms(5), Step::Value(2)])
//!     .open(CancellationToken::new());
//!
//! expect_next(&cursor, 1).await;
//! expect_next(&cursor, 2).await;
//! expect_end(&cursor).await;
//! # }
//! ```

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
pub mod counting;
pub mod helpers;
pub mod scripted;

pub use counting::{CountingSource, SourceStats};
pub use helpers::{
    assert_no_item_within, collect_values, expect_end, expect_error, expect_next, STEP_TIMEOUT,
};
pub use scripted::{
    delayed_source, failing_source, pending_source, scripted_source, ScriptedSource, Step,
};
