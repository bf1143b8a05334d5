// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
//! Concurrent operators for pull-based async sequences.
//!
//! Every operator is an [`AsyncSource`](sluice_core::AsyncSource) wrapping its upstream
//! sources. Opening it opens the upstreams on a child of the caller's token; the producer
//! loops feeding it are spawned by the first `advance()` and stopped by `close()`.
//!
//! - [`zip`] / [`zip_with`]: positional synchronization of N sources,
//! - [`combine_latest`] / [`combine_latest_with`]: latest-value recombination,
//! - [`SourceExt::group_by`]: per-key fan-out into live groups,
//! - [`SourceExt::map_concurrent`]: async selector with bounded concurrency,
//! - [`queue`]: buffering policies, the queue [`channel`](queue::channel) and
//!   [`SourceExt::buffer`].

#[macro_use]
mod logging;

mod pull;

pub mod combine_latest;
pub mod group_by;
pub mod map_concurrent;
pub mod prelude;
pub mod queue;
pub mod source_ext;
pub mod zip;

pub use combine_latest::{combine_latest, combine_latest_with, CombineLatest, CombineLatestAll};
pub use group_by::{Group, GroupBy, GroupRetention};
pub use map_concurrent::{MapConcurrent, MapOrdering};
pub use source_ext::SourceExt;
pub use zip::{zip, zip_with, Zip, ZipAll};
