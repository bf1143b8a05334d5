// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::channel::{channel, QueueCursor, QueueSender};
use super::policy::QueuePolicy;
use crate::pull::{pull, Pulled};
use async_trait::async_trait;
use parking_lot::Mutex;
use sluice_core::{
    AsyncCursor, AsyncSource, BoxCursor, CancellationToken, Result, SluiceError, SluiceTask,
};

/// Source decoupling `source` from its consumer through a queue governed by a policy.
///
/// Each open gets a fresh copy of the policy. The upstream is drained by its own producer
/// loop, started by the first `advance()`.
pub struct Buffer<S, P> {
    source: S,
    policy: P,
}

impl<S, P> Buffer<S, P> {
    pub(crate) fn new(source: S, policy: P) -> Self {
        Self { source, policy }
    }
}

impl<S, P> AsyncSource for Buffer<S, P>
where
    S: AsyncSource,
    P: QueuePolicy<Item = S::Item> + Clone + Sync,
{
    type Item = P::Unit;

    fn open(&self, cancel: CancellationToken) -> BoxCursor<P::Unit> {
        let internal = cancel.child_token();
        let upstream = self.source.open(internal.clone());
        let (sender, queue) = channel(self.policy.clone());

        Box::new(BufferCursor {
            queue,
            pending: Mutex::new(Some((upstream, sender))),
            task: Mutex::new(None),
            internal,
        })
    }
}

async fn produce<P>(
    upstream: BoxCursor<P::Item>,
    mut sender: QueueSender<P>,
    cancel: CancellationToken,
) where
    P: QueuePolicy,
    P::Item: Clone,
{
    let outcome = loop {
        match pull(&upstream, &cancel).await {
            Pulled::Item(item) => match cancel.run_until_cancelled(sender.enqueue(item)).await {
                Some(Ok(())) => {}
                // The queue is already terminal: overflow latched its error, or the consumer left.
                Some(Err(_)) => break Ok(()),
                None => break Err(SluiceError::Cancelled),
            },
            Pulled::Exhausted => break Ok(()),
            Pulled::Failed(error) => break Err(error),
            Pulled::Cancelled => break Err(SluiceError::Cancelled),
        }
    };

    match outcome {
        Ok(()) => sender.complete(),
        Err(error) => sender.fail(error),
    }
    upstream.close().await;
}

struct BufferCursor<P: QueuePolicy> {
    queue: QueueCursor<P>,
    pending: Mutex<Option<(BoxCursor<P::Item>, QueueSender<P>)>>,
    task: Mutex<Option<SluiceTask>>,
    internal: CancellationToken,
}

impl<P> BufferCursor<P>
where
    P: QueuePolicy,
    P::Item: Clone,
{
    fn start(&self) {
        let Some((upstream, sender)) = self.pending.lock().take() else {
            return;
        };
        let task = SluiceTask::spawn(&self.internal, move |cancel| {
            produce(upstream, sender, cancel)
        });
        *self.task.lock() = Some(task);
    }
}

#[async_trait]
impl<P> AsyncCursor for BufferCursor<P>
where
    P: QueuePolicy,
    P::Item: Clone,
{
    type Item = P::Unit;

    async fn advance(&self) -> Result<bool> {
        self.start();
        self.queue.advance().await
    }

    fn current(&self) -> Option<P::Unit> {
        self.queue.current()
    }

    async fn close(&self) {
        self.queue.close().await;
        self.internal.cancel();

        let pending = self.pending.lock().take();
        if let Some((upstream, sender)) = pending {
            sender.complete();
            upstream.close().await;
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            task.finished().await;
        }
    }
}

impl<P: QueuePolicy> Drop for BufferCursor<P> {
    fn drop(&mut self) {
        self.internal.cancel();
    }
}
