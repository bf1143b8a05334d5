// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Plumbing shared by the operator implementations.

use core::sync::atomic::{AtomicBool, Ordering};
use sluice_core::{AsyncCursor, BoxCursor, CancellationToken, Completion, Result, SluiceError};

/// The completion a consumer's `advance()` parks on, plus whether a parked cycle is outstanding.
///
/// A cycle stays outstanding until some `wait()` observes it, so an `advance()` whose future
/// was dropped leaves the cycle for the next `advance()` to pick up instead of losing the
/// value delivered into it.
#[derive(Debug)]
pub(crate) struct Parking<V> {
    completion: Completion<V>,
    armed: AtomicBool,
}

impl<V> Parking<V> {
    pub(crate) fn new() -> Self {
        Self {
            completion: Completion::new(),
            armed: AtomicBool::new(false),
        }
    }

    /// Start a cycle. Called under the operator lock, right before publishing `Accepting`.
    pub(crate) fn arm(&self) {
        self.completion.reset();
        self.armed.store(true, Ordering::Release);
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub(crate) async fn wait(&self) -> Result<V> {
        let outcome = self.completion.wait().await;
        self.armed.store(false, Ordering::Release);
        outcome
    }

    pub(crate) fn set_result(&self, value: V) {
        self.completion.set_result(value);
    }

    pub(crate) fn set_error(&self, error: SluiceError) {
        self.completion.set_error(error);
    }
}

/// Outcome of one upstream `advance()` issued by a producer loop.
pub(crate) enum Pulled<T> {
    Item(T),
    Exhausted,
    Failed(SluiceError),
    Cancelled,
}

/// Advance `upstream` once, giving up as soon as `cancel` fires.
pub(crate) async fn pull<T>(upstream: &BoxCursor<T>, cancel: &CancellationToken) -> Pulled<T>
where
    T: Clone + Send + 'static,
{
    match cancel.run_until_cancelled(upstream.advance()).await {
        None => Pulled::Cancelled,
        Some(Err(error)) if error.is_cancellation() => Pulled::Cancelled,
        Some(Err(error)) => Pulled::Failed(error),
        Some(Ok(false)) => Pulled::Exhausted,
        Some(Ok(true)) => match upstream.current() {
            Some(item) => Pulled::Item(item),
            None => Pulled::Exhausted,
        },
    }
}
