// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Reusable single-shot completion.
//!
//! A cursor owns one [`Completion`] for its consumer (and one per internal producer) for
//! its whole lifetime instead of allocating a fresh future for every element. Each use is
//! one *cycle*: [`reset`](Completion::reset) arms it, exactly one
//! [`set_result`](Completion::set_result) / [`set_error`](Completion::set_error) fills it,
//! and exactly one [`wait`](Completion::wait) observes the value.
//!
//! Breaking the cycle (completing twice, resetting while armed, awaiting a stale cycle)
//! is a bug in the owning operator and panics.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use parking_lot::Mutex;
use sluice_error::{Result, SluiceError};

#[derive(Debug)]
enum Slot<T> {
    Idle,
    Armed(Option<Waker>),
    Ready(Result<T>),
    Taken,
}

#[derive(Debug)]
struct Inner<T> {
    slot: Slot<T>,
    generation: u64,
}

/// A resettable single-value future slot.
///
/// # Example
///
/// ```
/// use sluice_core::Completion;
///
/// # futures::executor::block_on(async {
/// let completion = Completion::new();
///
/// completion.reset();
/// completion.set_result(1);
/// assert_eq!(completion.wait().await.unwrap(), 1);
///
/// completion.reset();
/// completion.set_result(2);
/// assert_eq!(completion.wait().await.unwrap(), 2);
/// # });
/// ```
#[derive(Debug)]
pub struct Completion<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Completion<T> {
    /// Create an idle completion. It must be [`reset`](Self::reset) before first use.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slot: Slot::Idle,
                generation: 0,
            }),
        }
    }

    /// Arm the completion for one more cycle.
    ///
    /// Any unobserved value from the previous cycle is discarded.
    ///
    /// # Panics
    ///
    /// Panics if the previous cycle is still pending.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.slot, Slot::Armed(_)) {
            drop(inner);
            panic!("Completion::reset called while the previous cycle is still pending");
        }
        inner.generation = inner.generation.wrapping_add(1);
        inner.slot = Slot::Armed(None);
    }

    /// Complete the current cycle with a value.
    ///
    /// # Panics
    ///
    /// Panics if the completion is not armed.
    pub fn set_result(&self, value: T) {
        self.complete(Ok(value));
    }

    /// Complete the current cycle with an error.
    ///
    /// # Panics
    ///
    /// Panics if the completion is not armed.
    pub fn set_error(&self, error: SluiceError) {
        self.complete(Err(error));
    }

    fn complete(&self, result: Result<T>) {
        let waker = {
            let mut inner = self.inner.lock();
            match core::mem::replace(&mut inner.slot, Slot::Ready(result)) {
                Slot::Armed(waker) => waker,
                stale => {
                    inner.slot = stale;
                    drop(inner);
                    panic!("Completion completed twice without an intervening reset");
                }
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// `true` between `reset` and the matching `set_*`.
    pub fn is_pending(&self) -> bool {
        matches!(self.inner.lock().slot, Slot::Armed(_))
    }

    /// Take a value that was delivered but never awaited.
    ///
    /// Cursors use this to hand out the outcome of an `advance()` whose future was
    /// dropped before it observed the completion.
    pub fn take_ready(&self) -> Option<Result<T>> {
        let mut inner = self.inner.lock();
        match core::mem::replace(&mut inner.slot, Slot::Taken) {
            Slot::Ready(result) => Some(result),
            other => {
                inner.slot = other;
                None
            }
        }
    }

    /// Await the current cycle.
    pub fn wait(&self) -> Wait<'_, T> {
        let generation = self.inner.lock().generation;
        Wait {
            completion: self,
            generation,
        }
    }
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`Completion::wait`].
#[derive(Debug)]
pub struct Wait<'a, T> {
    completion: &'a Completion<T>,
    generation: u64,
}

impl<T> Future for Wait<'_, T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.completion.inner.lock();
        if inner.generation != self.generation {
            drop(inner);
            panic!("awaited a stale Completion cycle");
        }

        match core::mem::replace(&mut inner.slot, Slot::Taken) {
            Slot::Ready(result) => Poll::Ready(result),
            Slot::Armed(_) => {
                inner.slot = Slot::Armed(Some(cx.waker().clone()));
                Poll::Pending
            }
            Slot::Idle | Slot::Taken => {
                drop(inner);
                panic!("awaited a Completion that was never reset");
            }
        }
    }
}
