// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Per-key fan-out of one upstream into independently pulled groups.
//!
//! A single producer loop reads the upstream and computes a key for every item. The first
//! item of a new key surfaces a [`Group`] on the outer cursor, in first-occurrence order;
//! later items for the key are handed to that group's pending `advance()`.
//!
//! # The "open it now" rule
//!
//! Groups are live, not replayable. The outer consumer must [`open`](sluice_core::AsyncSource::open)
//! a surfaced group before it advances the outer cursor again (or closes it). A group left
//! unopened at that point is *too late*: its buffered item and every later item for its key
//! are discarded, and opening it yields a cursor failing with
//! [`SluiceError::GroupOpenedTooLate`](sluice_core::SluiceError::GroupOpenedTooLate).
//!
//! There is no per-group queue. The producer loop waits until the group that received an
//! item has pulled it, so a slow group slows the whole upstream down. Consumers that read
//! several groups at once usually drain each one on its own task.
//!
//! # Lifetime
//!
//! - Closing the outer cursor stops new groups from surfacing; already opened groups keep
//!   receiving items and the upstream is cancelled only once none of them remains open.
//! - [`GroupRetention::KeepUntilComplete`] (default) keeps a closed group's key mapped, so
//!   its later items are dropped. [`GroupRetention::RemoveOnClose`] forgets the key and a
//!   later item starts a fresh group.
//! - An upstream (or key function) error reaches the outer cursor and every open group.
//!
//! # Example
//!
//! ```rust
//! use sluice_core::{iter_source, AsyncCursor, AsyncSource, CancellationToken};
//! use sluice_stream::SourceExt;
//!
//! # #[tokio::main]
//! # async fn main() -> sluice_core::Result<()> {
//! let token = CancellationToken::new();
//! let groups = iter_source(vec![1, 2, 3, 4, 5]).group_by(|n| n % 2).open(token.clone());
//!
//! let mut drains = Vec::new();
//! while groups.advance().await? {
//!     let group = groups.current().expect("group after successful advance");
//!     let cursor = group.open(token.clone());
//!     drains.push(tokio::spawn(async move {
//!         let mut items = Vec::new();
//!         while cursor.advance().await? {
//!             items.extend(cursor.current());
//!         }
//!         sluice_core::Result::Ok((*group.key(), items))
//!     }));
//! }
//!
//! let mut result = Vec::new();
//! for drain in drains {
//!     result.push(drain.await.expect("drain task")?);
//! }
//! assert_eq!(result, vec![(1, vec![1, 3, 5]), (0, vec![2, 4])]);
//! # Ok(())
//! # }
//! ```

mod implementation;

pub use implementation::{Group, GroupBy, GroupRetention};
