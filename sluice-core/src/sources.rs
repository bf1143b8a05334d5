// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Leaf sources: in-memory sequences, constant outcomes and `futures::Stream` adapters.

use crate::current_slot::{AdvanceGate, CurrentSlot};
use crate::cursor::{AsyncCursor, AsyncSource, BoxCursor};
use crate::CancellationToken;
use async_trait::async_trait;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, Ordering};
use futures::lock::Mutex as FutureMutex;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use sluice_error::{Result, SluiceError};
use std::sync::Arc;

/// Source replaying a fixed list of items on every open.
#[derive(Debug, Clone)]
pub struct IterSource<T> {
    items: Arc<[T]>,
}

/// Create a source over `items`.
///
/// ```
/// use sluice_core::{iter_source, AsyncCursor, AsyncSource, CancellationToken};
///
/// # futures::executor::block_on(async {
/// let cursor = iter_source(vec![1, 2]).open(CancellationToken::new());
/// assert!(cursor.advance().await.unwrap());
/// assert_eq!(cursor.current(), Some(1));
/// # });
/// ```
pub fn iter_source<I>(items: I) -> IterSource<I::Item>
where
    I: IntoIterator,
{
    IterSource {
        items: items.into_iter().collect(),
    }
}

impl<T> AsyncSource for IterSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    fn open(&self, cancel: CancellationToken) -> BoxCursor<T> {
        Box::new(IterCursor {
            items: self.items.clone(),
            position: Mutex::new(0),
            closed: AtomicBool::new(false),
            current: CurrentSlot::new(),
            gate: AdvanceGate::new(),
            cancel,
        })
    }
}

struct IterCursor<T> {
    items: Arc<[T]>,
    position: Mutex<usize>,
    closed: AtomicBool,
    current: CurrentSlot<T>,
    gate: AdvanceGate,
    cancel: CancellationToken,
}

#[async_trait]
impl<T> AsyncCursor for IterCursor<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    async fn advance(&self) -> Result<bool> {
        let _ticket = self.gate.enter()?;
        self.current.clear();
        if self.closed.load(Ordering::Acquire) {
            return Ok(false);
        }
        if self.cancel.is_cancelled() {
            self.closed.store(true, Ordering::Release);
            return Err(SluiceError::Cancelled);
        }

        let mut position = self.position.lock();
        match self.items.get(*position) {
            Some(item) => {
                *position += 1;
                self.current.set(item.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn current(&self) -> Option<T> {
        self.current.get()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.current.clear();
    }
}

/// Source whose cursors are exhausted immediately.
#[derive(Debug)]
pub struct EmptySource<T>(PhantomData<fn() -> T>);

pub fn empty_source<T>() -> EmptySource<T> {
    EmptySource(PhantomData)
}

impl<T: Clone + Send + 'static> AsyncSource for EmptySource<T> {
    type Item = T;

    fn open(&self, _cancel: CancellationToken) -> BoxCursor<T> {
        Box::new(OutcomeCursor::<T>::new(None))
    }
}

/// Source whose cursors fail with the given error on the first `advance()`.
#[derive(Debug)]
pub struct ErrorSource<T> {
    error: SluiceError,
    _item: PhantomData<fn() -> T>,
}

pub fn error_source<T>(error: SluiceError) -> ErrorSource<T> {
    ErrorSource {
        error,
        _item: PhantomData,
    }
}

impl<T: Clone + Send + 'static> AsyncSource for ErrorSource<T> {
    type Item = T;

    fn open(&self, _cancel: CancellationToken) -> BoxCursor<T> {
        Box::new(OutcomeCursor::<T>::new(Some(self.error.clone())))
    }
}

/// Cursor that yields no items: it fails once with its error (if any), then reports exhaustion.
///
/// Also used by operators to hand out cursors that are unusable from the start, such as
/// a group opened too late.
pub struct OutcomeCursor<T> {
    error: Mutex<Option<SluiceError>>,
    gate: AdvanceGate,
    _item: PhantomData<fn() -> T>,
}

impl<T> OutcomeCursor<T> {
    pub fn new(error: Option<SluiceError>) -> Self {
        Self {
            error: Mutex::new(error),
            gate: AdvanceGate::new(),
            _item: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> AsyncCursor for OutcomeCursor<T> {
    type Item = T;

    async fn advance(&self) -> Result<bool> {
        let _ticket = self.gate.enter()?;
        match self.error.lock().take() {
            Some(error) => Err(error),
            None => Ok(false),
        }
    }

    fn current(&self) -> Option<T> {
        None
    }

    async fn close(&self) {
        self.error.lock().take();
    }
}

/// Source opening a fresh `futures::Stream` from a factory on every open.
pub struct StreamSource<F> {
    factory: F,
}

/// Adapt a stream factory into a source.
///
/// The stream yields `Result<T>`; the first `Err` terminates the cursor.
pub fn stream_source<F, S, T>(factory: F) -> StreamSource<F>
where
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = Result<T>> + Send + 'static,
    T: Clone + Send + 'static,
{
    StreamSource { factory }
}

impl<F, S, T> AsyncSource for StreamSource<F>
where
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = Result<T>> + Send + 'static,
    T: Clone + Send + 'static,
{
    type Item = T;

    fn open(&self, cancel: CancellationToken) -> BoxCursor<T> {
        Box::new(StreamCursor {
            stream: FutureMutex::new(Some((self.factory)().boxed())),
            closed: AtomicBool::new(false),
            current: CurrentSlot::new(),
            gate: AdvanceGate::new(),
            cancel: cancel.child_token(),
            outer: cancel,
        })
    }
}

struct StreamCursor<T> {
    stream: FutureMutex<Option<BoxStream<'static, Result<T>>>>,
    closed: AtomicBool,
    current: CurrentSlot<T>,
    gate: AdvanceGate,
    cancel: CancellationToken,
    outer: CancellationToken,
}

#[async_trait]
impl<T: Clone + Send + 'static> AsyncCursor for StreamCursor<T> {
    type Item = T;

    async fn advance(&self) -> Result<bool> {
        let _ticket = self.gate.enter()?;
        self.current.clear();

        let mut stream = self.stream.lock().await;
        let Some(inner) = stream.as_mut() else {
            return Ok(false);
        };

        let next = self.cancel.run_until_cancelled(inner.next()).await;
        match next {
            Some(Some(Ok(item))) => {
                self.current.set(item);
                Ok(true)
            }
            Some(Some(Err(error))) => {
                debug!("stream source failed: {}", error);
                *stream = None;
                Err(error)
            }
            Some(None) => {
                *stream = None;
                Ok(false)
            }
            None => {
                *stream = None;
                if self.closed.load(Ordering::Acquire) || !self.outer.is_cancelled() {
                    Ok(false)
                } else {
                    Err(SluiceError::Cancelled)
                }
            }
        }
    }

    fn current(&self) -> Option<T> {
        self.current.get()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Interrupts a pending advance(), which then releases the stream lock
        self.cancel.cancel();
        self.stream.lock().await.take();
        self.current.clear();
    }
}
