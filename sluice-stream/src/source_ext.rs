// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Method-call syntax for the operators of this crate.

use crate::combine_latest::{combine_latest, combine_latest_with, CombineLatest, CombineLatestAll};
use crate::group_by::GroupBy;
use crate::map_concurrent::{MapConcurrent, MapOrdering};
use crate::queue::{Buffer, QueuePolicy};
use crate::zip::{zip, zip_with, Zip, ZipAll};
use core::future::Future;
use core::hash::Hash;
use futures::FutureExt;
use sluice_core::{AsyncSource, BoxSource, Result};
use std::sync::Arc;

/// Extension trait chaining operators onto any [`AsyncSource`].
///
/// The binary `zip` / `combine_latest` forms pair `self` with one more source; use
/// [`zip`](crate::zip()) and [`combine_latest`](crate::combine_latest()) directly for N sources.
pub trait SourceExt: AsyncSource + Sized {
    /// Erase the source type.
    fn boxed(self) -> BoxSource<Self::Item> {
        Arc::new(self)
    }

    /// Rows `[a, b]` of the i-th items of `self` and `other`.
    fn zip<O>(self, other: O) -> ZipAll<Self::Item>
    where
        O: AsyncSource<Item = Self::Item>,
    {
        zip(vec![self.boxed(), other.boxed()])
    }

    /// [`zip`](SourceExt::zip) mapped through a fallible selector.
    fn zip_with<O, R, F>(self, other: O, selector: F) -> Zip<Self::Item, F>
    where
        O: AsyncSource<Item = Self::Item>,
        F: Fn(Vec<Self::Item>) -> Result<R> + Send + Sync + 'static,
    {
        zip_with(vec![self.boxed(), other.boxed()], selector)
    }

    /// Latest-value combinations `[a, b]` of `self` and `other`.
    fn combine_latest<O>(self, other: O) -> CombineLatestAll<Self::Item>
    where
        O: AsyncSource<Item = Self::Item>,
    {
        combine_latest(vec![self.boxed(), other.boxed()])
    }

    /// [`combine_latest`](SourceExt::combine_latest) mapped through a fallible selector.
    fn combine_latest_with<O, R, F>(self, other: O, selector: F) -> CombineLatest<Self::Item, F>
    where
        O: AsyncSource<Item = Self::Item>,
        F: Fn(Vec<Self::Item>) -> Result<R> + Send + Sync + 'static,
    {
        combine_latest_with(vec![self.boxed(), other.boxed()], selector)
    }

    /// Split the sequence into one group per key.
    ///
    /// See [`group_by`](crate::group_by) for the rule every outer consumer must follow.
    fn group_by<K, F>(self, key_fn: F) -> GroupBy<Self, K>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        F: Fn(&Self::Item) -> K + Send + Sync + 'static,
    {
        GroupBy::new(self, Arc::new(move |item: &Self::Item| Ok(key_fn(item))))
    }

    /// [`group_by`](SourceExt::group_by) with a fallible key function. A key error
    /// terminates the outer cursor and every open group.
    fn try_group_by<K, F>(self, key_fn: F) -> GroupBy<Self, K>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        F: Fn(&Self::Item) -> Result<K> + Send + Sync + 'static,
    {
        GroupBy::new(self, Arc::new(key_fn))
    }

    /// Run `selector` over the items with at most `limit` invocations in flight.
    ///
    /// A `limit` of zero yields a cursor failing with `InvalidState`.
    fn map_concurrent<R, F, Fut>(
        self,
        limit: usize,
        ordering: MapOrdering,
        selector: F,
    ) -> MapConcurrent<Self, R>
    where
        R: Clone + Send + 'static,
        F: Fn(Self::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let selector = Arc::new(move |item: Self::Item| selector(item).boxed());
        MapConcurrent::new(self, limit, ordering, selector)
    }

    /// Decouple the consumer from this source through a queue governed by `policy`.
    fn buffer<P>(self, policy: P) -> Buffer<Self, P>
    where
        P: QueuePolicy<Item = Self::Item> + Clone + Sync,
    {
        Buffer::new(self, policy)
    }
}

impl<S: AsyncSource> SourceExt for S {}
