// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A source wrapper recording how its cursors are driven.

use async_trait::async_trait;
use core::sync::atomic::{AtomicUsize, Ordering};
use sluice_core::{AsyncCursor, AsyncSource, BoxCursor, CancellationToken};
use sluice_error::Result;
use std::sync::Arc;

/// Counters shared by every cursor of one [`CountingSource`].
#[derive(Debug, Default)]
pub struct SourceStats {
    opened: AtomicUsize,
    advanced: AtomicUsize,
    closed: AtomicUsize,
    dropped: AtomicUsize,
}

impl SourceStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// `advance()` calls that returned, whatever their outcome.
    pub fn advanced(&self) -> usize {
        self.advanced.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Cursors dropped, closed or not.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// Wraps `inner` and counts opens, advances, closes and drops of its cursors.
#[derive(Debug)]
pub struct CountingSource<S> {
    inner: S,
    stats: Arc<SourceStats>,
}

impl<S> CountingSource<S> {
    /// Wrap `inner`; the returned stats stay readable after the source moved into an operator.
    pub fn new(inner: S) -> (Self, Arc<SourceStats>) {
        let stats = Arc::new(SourceStats::default());
        (
            Self {
                inner,
                stats: stats.clone(),
            },
            stats,
        )
    }
}

impl<S: AsyncSource> AsyncSource for CountingSource<S> {
    type Item = S::Item;

    fn open(&self, cancel: CancellationToken) -> BoxCursor<S::Item> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Box::new(CountingCursor {
            inner: self.inner.open(cancel),
            stats: self.stats.clone(),
        })
    }
}

struct CountingCursor<T> {
    inner: BoxCursor<T>,
    stats: Arc<SourceStats>,
}

#[async_trait]
impl<T: Clone + Send + 'static> AsyncCursor for CountingCursor<T> {
    type Item = T;

    async fn advance(&self) -> Result<bool> {
        let outcome = self.inner.advance().await;
        self.stats.advanced.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    fn current(&self) -> Option<T> {
        self.inner.current()
    }

    async fn close(&self) {
        self.inner.close().await;
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl<T> Drop for CountingCursor<T> {
    fn drop(&mut self) {
        self.stats.dropped.fetch_add(1, Ordering::SeqCst);
    }
}
