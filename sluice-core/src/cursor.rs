// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The cursor protocol every operator implements and consumes.
//!
//! An [`AsyncSource`] is a referentially transparent factory: each
//! [`open`](AsyncSource::open) starts an independent enumeration and returns an
//! [`AsyncCursor`]. The consumer drives the cursor with [`advance`](AsyncCursor::advance),
//! reads [`current`](AsyncCursor::current) after every `Ok(true)`, and eventually calls
//! [`close`](AsyncCursor::close).
//!
//! Rules shared by every implementation in this workspace:
//!
//! - at most one `advance()` may be in flight; a second concurrent call fails with
//!   [`SluiceError::ConcurrentAdvance`](sluice_error::SluiceError::ConcurrentAdvance);
//! - `current()` is `Some` only between a successful `advance()` and the next
//!   `advance()`/`close()`;
//! - `close()` is idempotent, never fails, and may race a pending `advance()`, which then
//!   resolves to `Ok(false)` exactly once;
//! - once an error has been reported, later `advance()` calls return `Ok(false)`.

use crate::CancellationToken;
use async_trait::async_trait;
use sluice_error::Result;
use std::sync::Arc;

/// Pull-based iterator over an asynchronous sequence.
#[async_trait]
pub trait AsyncCursor: Send + Sync {
    /// Items produced by the cursor.
    type Item: Clone + Send + 'static;

    /// Move to the next item. `Ok(true)` means [`current`](Self::current) holds it,
    /// `Ok(false)` means the sequence is exhausted.
    async fn advance(&self) -> Result<bool>;

    /// The item produced by the last successful `advance()`.
    fn current(&self) -> Option<Self::Item>;

    /// Stop the enumeration and release upstream resources.
    async fn close(&self);
}

/// Type-erased cursor.
pub type BoxCursor<T> = Box<dyn AsyncCursor<Item = T>>;

#[async_trait]
impl<C: AsyncCursor + ?Sized> AsyncCursor for Box<C> {
    type Item = C::Item;

    async fn advance(&self) -> Result<bool> {
        (**self).advance().await
    }

    fn current(&self) -> Option<Self::Item> {
        (**self).current()
    }

    async fn close(&self) {
        (**self).close().await;
    }
}

/// Factory of independent cursors.
pub trait AsyncSource: Send + Sync + 'static {
    /// Items produced by cursors opened from this source.
    type Item: Clone + Send + 'static;

    /// Start a new enumeration observing `cancel`.
    fn open(&self, cancel: CancellationToken) -> BoxCursor<Self::Item>;
}

/// Type-erased, shareable source.
pub type BoxSource<T> = Arc<dyn AsyncSource<Item = T>>;

impl<S: AsyncSource + ?Sized> AsyncSource for Arc<S> {
    type Item = S::Item;

    fn open(&self, cancel: CancellationToken) -> BoxCursor<Self::Item> {
        (**self).open(cancel)
    }
}
