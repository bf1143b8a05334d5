// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Extension methods turning tokio mpsc receivers into sources.

use async_trait::async_trait;
use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use sluice_core::{
    AdvanceGate, AsyncCursor, AsyncSource, BoxCursor, CancellationToken, CurrentSlot,
    OutcomeCursor, Result, SluiceError,
};
use tokio::sync::mpsc;

enum Inbox<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

impl<T> Inbox<T> {
    async fn recv(&mut self) -> Option<T> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Source draining a tokio mpsc receiver.
///
/// A receiver can only be drained once: the first `open()` takes it, later opens yield a
/// cursor failing with `AlreadyOpened`. The cursor ends when every sender is dropped.
pub struct ReceiverSource<T> {
    inbox: Mutex<Option<Inbox<T>>>,
}

/// Extension trait for tokio mpsc receivers.
///
/// # Examples
///
/// ```rust
/// use sluice::prelude::*;
/// use sluice::ReceiverExt;
/// use tokio::sync::mpsc;
///
/// # #[tokio::main]
/// # async fn main() -> sluice::Result<()> {
/// let (tx, rx) = mpsc::unbounded_channel();
/// tx.send(1).unwrap();
/// tx.send(2).unwrap();
/// drop(tx);
///
/// let cursor = rx.into_source().open(CancellationToken::new());
/// let mut values = Vec::new();
/// while cursor.advance().await? {
///     values.extend(cursor.current());
/// }
/// assert_eq!(values, vec![1, 2]);
/// # Ok(())
/// # }
/// ```
pub trait ReceiverExt<T> {
    /// Wrap the receiver into a single-open [`ReceiverSource`].
    fn into_source(self) -> ReceiverSource<T>;
}

impl<T> ReceiverExt<T> for mpsc::Receiver<T> {
    fn into_source(self) -> ReceiverSource<T> {
        ReceiverSource {
            inbox: Mutex::new(Some(Inbox::Bounded(self))),
        }
    }
}

impl<T> ReceiverExt<T> for mpsc::UnboundedReceiver<T> {
    fn into_source(self) -> ReceiverSource<T> {
        ReceiverSource {
            inbox: Mutex::new(Some(Inbox::Unbounded(self))),
        }
    }
}

impl<T> AsyncSource for ReceiverSource<T>
where
    T: Clone + Send + 'static,
{
    type Item = T;

    fn open(&self, cancel: CancellationToken) -> BoxCursor<T> {
        let Some(inbox) = self.inbox.lock().take() else {
            return Box::new(OutcomeCursor::new(Some(SluiceError::already_opened(
                "receiver source",
            ))));
        };

        Box::new(ReceiverCursor {
            inbox: tokio::sync::Mutex::new(Some(inbox)),
            closing: cancel.child_token(),
            closed: AtomicBool::new(false),
            current: CurrentSlot::new(),
            gate: AdvanceGate::new(),
        })
    }
}

struct ReceiverCursor<T> {
    inbox: tokio::sync::Mutex<Option<Inbox<T>>>,
    closing: CancellationToken,
    closed: AtomicBool,
    current: CurrentSlot<T>,
    gate: AdvanceGate,
}

#[async_trait]
impl<T> AsyncCursor for ReceiverCursor<T>
where
    T: Clone + Send + 'static,
{
    type Item = T;

    async fn advance(&self) -> Result<bool> {
        let _ticket = self.gate.enter()?;
        self.current.clear();

        let mut inbox = self.inbox.lock().await;
        let Some(rx) = inbox.as_mut() else {
            return Ok(false);
        };

        match self.closing.run_until_cancelled(rx.recv()).await {
            Some(Some(item)) => {
                self.current.set(item);
                Ok(true)
            }
            Some(None) => {
                *inbox = None;
                Ok(false)
            }
            None => {
                *inbox = None;
                if self.closed.load(Ordering::Acquire) {
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
        self.closed.store(true, Ordering::Release);
        self.closing.cancel();
        self.current.clear();
        self.inbox.lock().await.take();
    }
}
