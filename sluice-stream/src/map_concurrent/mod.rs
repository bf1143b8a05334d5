// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Async selector applied to upstream items with bounded concurrency.
//!
//! Up to `limit` selector invocations run at once, each on its own task. An invocation
//! counts against the limit from the moment it is dispatched until its result has been
//! pulled by the consumer, so a slow consumer also throttles the upstream.
//!
//! # Ordering
//!
//! - [`MapOrdering::Preserve`]: results come out in upstream order. A slow early item
//!   holds back later items that already finished.
//! - [`MapOrdering::Completion`]: results come out as soon as they finish.
//!
//! # Errors
//!
//! The first selector (or upstream) error stops the intake of new items. Work already in
//! flight is allowed to finish, later errors are dropped, and the first error is returned
//! once every result queued ahead of it has been delivered.
//!
//! # Example
//!
//! ```rust
//! use sluice_core::{iter_source, AsyncCursor, AsyncSource, CancellationToken};
//! use sluice_stream::{MapOrdering, SourceExt};
//!
//! # #[tokio::main]
//! # async fn main() -> sluice_core::Result<()> {
//! let doubled = iter_source(vec![1, 2, 3, 4])
//!     .map_concurrent(2, MapOrdering::Preserve, |n| async move { Ok(n * 2) });
//! let cursor = doubled.open(CancellationToken::new());
//!
//! let mut results = Vec::new();
//! while cursor.advance().await? {
//!     results.extend(cursor.current());
//! }
//! assert_eq!(results, vec![2, 4, 6, 8]);
//! # Ok(())
//! # }
//! ```

mod implementation;

pub use implementation::{MapConcurrent, MapOrdering};
