// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! N-way positional synchronization of independent sources.
//!
//! Every `advance()` starts one *round*: each upstream producer pulls exactly one item,
//! and the producer that delivers the last missing item completes the round with the row
//! of all N values, in source order. The zipped sequence is as long as its shortest
//! source; the first exhausted or failed source ends it and cancels the others, so no
//! partial row is ever emitted.
//!
//! # Example
//!
//! ```rust
//! use sluice_core::{iter_source, AsyncCursor, AsyncSource, CancellationToken};
//! use sluice_stream::zip;
//!
//! # #[tokio::main]
//! # async fn main() -> sluice_core::Result<()> {
//! let zipped = zip(vec![iter_source(vec![1, 2, 3]), iter_source(vec![10, 20])]);
//! let cursor = zipped.open(CancellationToken::new());
//!
//! assert!(cursor.advance().await?);
//! assert_eq!(cursor.current(), Some(vec![1, 10]));
//! assert!(cursor.advance().await?);
//! assert_eq!(cursor.current(), Some(vec![2, 20]));
//! assert!(!cursor.advance().await?);
//! cursor.close().await;
//! # Ok(())
//! # }
//! ```

mod implementation;

pub use implementation::{zip, zip_with, Zip, ZipAll};
