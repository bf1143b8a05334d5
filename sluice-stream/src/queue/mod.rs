// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Queues decoupling a producer from a pulling consumer.
//!
//! A [`QueuePolicy`] decides what a full queue does:
//!
//! | Policy | On overflow | Unit |
//! |---|---|---|
//! | [`ThrowOnFull`] | fails the queue with `ResourceLimitExceeded` | item |
//! | [`Backpressure`] | the producer waits for the consumer | item |
//! | [`MostRecent`] | evicts the oldest buffered item | item |
//! | [`LeastRecent`] | discards the new item | item |
//! | [`MostRecentBatch`] / [`LeastRecentBatch`] | as above | whole buffer |
//!
//! Lossy policies count what they discard: `dropped + delivered == enqueued` always holds.
//!
//! [`channel`] exposes the queue directly to code that produces values imperatively;
//! [`SourceExt::buffer`](crate::SourceExt::buffer) places one between two sources.
//!
//! # Example
//!
//! ```rust
//! use sluice_core::AsyncCursor;
//! use sluice_stream::queue::{channel, MostRecent};
//!
//! # #[tokio::main]
//! # async fn main() -> sluice_core::Result<()> {
//! let (mut sender, cursor) = channel(MostRecent::new(1));
//! for n in 1..=3 {
//!     sender.enqueue(n).await?;
//! }
//! sender.complete();
//!
//! assert!(cursor.advance().await?);
//! assert_eq!(cursor.current(), Some(3));
//! assert_eq!(cursor.dropped(), 2);
//! assert!(!cursor.advance().await?);
//! # Ok(())
//! # }
//! ```

mod buffer;
mod channel;
mod policy;

pub use buffer::Buffer;
pub use channel::{channel, QueueCursor, QueueSender};
pub use policy::{
    Backpressure, LeastRecent, LeastRecentBatch, MostRecent, MostRecentBatch, QueuePolicy,
    ThrowOnFull,
};
