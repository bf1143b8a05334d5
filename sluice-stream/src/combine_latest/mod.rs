// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! N-way latest-value recombination.
//!
//! # Behavior
//!
//! - Nothing is emitted until every source has produced at least once
//! - After that, every update from any source yields a new combination made of that
//!   update and the latest value held for every other source
//! - Only the most recent unconsumed combination is kept: a newer one overwrites it
//! - A source that updated waits until the combination carrying its update has been
//!   pulled (or overwritten and then pulled) before producing again
//! - The sequence completes once every source has completed, or as soon as a source
//!   completes without ever producing
//! - The first error from any source is surfaced immediately and cancels the others
//!
//! # Example
//!
//! ```rust
//! use sluice_core::{iter_source, AsyncCursor, AsyncSource, CancellationToken};
//! use sluice_stream::combine_latest;
//!
//! # #[tokio::main]
//! # async fn main() -> sluice_core::Result<()> {
//! let combined = combine_latest(vec![iter_source(vec![1, 2]), iter_source(vec![10])]);
//! let cursor = combined.open(CancellationToken::new());
//!
//! let mut rows = Vec::new();
//! while cursor.advance().await? {
//!     rows.extend(cursor.current());
//! }
//! assert_eq!(rows, vec![vec![1, 10], vec![2, 10]]);
//! # Ok(())
//! # }
//! ```

mod implementation;

pub use implementation::{combine_latest, combine_latest_with, CombineLatest, CombineLatestAll};
