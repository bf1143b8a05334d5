// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! # Sluice
//!
//! Pull-based async sequences and the operators that combine them.
//!
//! ## Overview
//!
//! A source is opened into a cursor; the consumer pulls items with `advance()` and reads
//! them with `current()`. Nothing is produced ahead of demand except what an operator is
//! explicitly allowed to hold:
//!
//! - `zip` and `combine_latest` hold one value per source,
//! - `group_by` holds one item per group,
//! - `map_concurrent` holds at most `limit` invocations,
//! - `buffer` and `queue::channel` hold whatever their policy allows.
//!
//! ## Quick Start
//!
//! ```rust
//! use sluice::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> sluice::Result<()> {
//! let pipeline = iter_source(vec![1, 2, 3])
//!     .zip(iter_source(vec![10, 20, 30]))
//!     .map_concurrent(2, MapOrdering::Preserve, |row| async move { Ok(row[0] + row[1]) });
//!
//! let cursor = pipeline.open(CancellationToken::new());
//! let mut sums = Vec::new();
//! while cursor.advance().await? {
//!     sums.extend(cursor.current());
//! }
//! assert_eq!(sums, vec![11, 22, 33]);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
pub mod receiver_ext;

pub use receiver_ext::{ReceiverExt, ReceiverSource};

pub use sluice_core::{
    empty_source, error_source, iter_source, stream_source, AsyncCursor, AsyncSource, BoxCursor,
    BoxSource, CancellationToken, IntoStream, Result, SluiceError,
};
pub use sluice_stream::{
    combine_latest, combine_latest_with, queue, zip, zip_with, Group, GroupRetention,
    MapOrdering, SourceExt,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::receiver_ext::ReceiverExt;
    pub use sluice_core::{
        empty_source, iter_source, AsyncCursor, AsyncSource, CancellationToken, SluiceError,
    };
    pub use sluice_stream::prelude::*;
    pub use sluice_stream::{combine_latest, zip};
}
