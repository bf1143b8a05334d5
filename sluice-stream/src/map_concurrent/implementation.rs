// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::pull::{pull, Parking, Pulled};
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use sluice_core::{
    logical_state, AdvanceGate, AsyncCursor, AsyncSource, BoxCursor, CancellationToken,
    Completion, CurrentSlot, OutcomeCursor, Result, SluiceError, SluiceTask, SpinGuard,
    SpinState,
};
use std::collections::VecDeque;
use std::sync::Arc;

logical_state! {
    enum MapState {
        Initial = 0,
        Idle = 1,
        Accepting = 2,
        Final = 3,
    }
}

/// Delivery order of [`MapConcurrent`] results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MapOrdering {
    /// Upstream order.
    #[default]
    Preserve,
    /// Order in which the selector invocations finish.
    Completion,
}

pub(crate) type Selector<T, R> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// Source running an async selector over `source` with at most `limit` invocations in flight.
pub struct MapConcurrent<S: AsyncSource, R> {
    source: S,
    limit: usize,
    ordering: MapOrdering,
    selector: Selector<S::Item, R>,
}

impl<S: AsyncSource, R> MapConcurrent<S, R> {
    pub(crate) fn new(
        source: S,
        limit: usize,
        ordering: MapOrdering,
        selector: Selector<S::Item, R>,
    ) -> Self {
        Self {
            source,
            limit,
            ordering,
            selector,
        }
    }
}

impl<S, R> AsyncSource for MapConcurrent<S, R>
where
    S: AsyncSource,
    R: Clone + Send + 'static,
{
    type Item = R;

    fn open(&self, cancel: CancellationToken) -> BoxCursor<R> {
        if self.limit == 0 {
            return Box::new(OutcomeCursor::new(Some(SluiceError::invalid_state(
                "map_concurrent limit must be at least 1",
            ))));
        }

        let internal = cancel.child_token();
        let upstream = self.source.open(internal.clone());

        Box::new(MapCursor {
            shared: Arc::new(Shared::new(self.limit, self.ordering, internal)),
            upstream: Mutex::new(Some(upstream)),
            selector: self.selector.clone(),
            producer: Mutex::new(None),
            current: CurrentSlot::new(),
            gate: AdvanceGate::new(),
        })
    }
}

/// A slab record. Vacant records are recycled through the free list.
enum Node<R> {
    Vacant,
    Running,
    Done(R),
    Failed(SluiceError),
    /// Finished with an error after the first one.
    Skipped,
}

enum Next<R> {
    Item(R),
    Failed(SluiceError),
    Exhausted,
    Pending,
}

enum Reserve {
    Available,
    Full,
    Stopped,
}

struct MapData<R> {
    nodes: Vec<Node<R>>,
    free: Vec<usize>,
    /// Delivery FIFO of node indices.
    ready: VecDeque<usize>,
    /// Dispatched and not yet delivered.
    in_flight: usize,
    upstream_done: bool,
    failed: bool,
    producer_parked: bool,
}

impl<R> MapData<R> {
    fn allocate(&mut self, node: Node<R>) -> usize {
        self.in_flight += 1;
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn next_ready(&mut self) -> Next<R> {
        while let Some(&index) = self.ready.front() {
            if matches!(self.nodes[index], Node::Running) {
                break;
            }

            self.ready.pop_front();
            self.free.push(index);
            self.in_flight -= 1;
            match core::mem::replace(&mut self.nodes[index], Node::Vacant) {
                Node::Done(value) => return Next::Item(value),
                Node::Failed(error) => return Next::Failed(error),
                Node::Skipped | Node::Vacant | Node::Running => {}
            }
        }

        if self.upstream_done && self.in_flight == 0 {
            Next::Exhausted
        } else {
            Next::Pending
        }
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.ready.clear();
        self.in_flight = 0;
    }
}

struct Shared<R> {
    state: SpinState<MapState, MapData<R>>,
    consumer: Parking<()>,
    producer: Completion<()>,
    internal: CancellationToken,
    limit: usize,
    ordering: MapOrdering,
    workers: Mutex<Vec<SluiceTask>>,
}

impl<R: Clone + Send + 'static> Shared<R> {
    fn new(limit: usize, ordering: MapOrdering, internal: CancellationToken) -> Self {
        Self {
            state: SpinState::new(
                MapState::Initial,
                MapData {
                    nodes: Vec::with_capacity(limit),
                    free: Vec::new(),
                    ready: VecDeque::with_capacity(limit),
                    in_flight: 0,
                    upstream_done: false,
                    failed: false,
                    producer_parked: false,
                },
            ),
            consumer: Parking::new(),
            producer: Completion::new(),
            internal,
            limit,
            ordering,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Publish a state change to a parked consumer, if any.
    fn notify(&self, guard: SpinGuard<'_, MapState, MapData<R>>) {
        if guard.previous() == MapState::Accepting {
            guard.unlock(MapState::Idle);
            self.consumer.set_result(());
        } else {
            guard.release();
        }
    }

    fn reserve(&self) -> Reserve {
        let mut guard = self.state.lock();
        if guard.previous() == MapState::Final || guard.failed {
            guard.release();
            return Reserve::Stopped;
        }
        if guard.in_flight < self.limit {
            guard.release();
            return Reserve::Available;
        }

        guard.producer_parked = true;
        self.producer.reset();
        guard.release();
        Reserve::Full
    }

    fn dispatch<T>(self: &Arc<Self>, item: T, selector: &Selector<T, R>) -> bool
    where
        T: Send + 'static,
    {
        let mut guard = self.state.lock();
        if guard.previous() == MapState::Final || guard.failed {
            guard.release();
            return false;
        }

        let index = guard.allocate(Node::Running);
        if self.ordering == MapOrdering::Preserve {
            guard.ready.push_back(index);
        }
        guard.release();

        let work = selector(item);
        let shared = self.clone();
        let worker = SluiceTask::spawn(&self.internal, move |cancel| async move {
            let outcome = cancel
                .run_until_cancelled(work)
                .await
                .unwrap_or(Err(SluiceError::Cancelled));
            shared.on_finished(index, outcome);
        });

        let mut workers = self.workers.lock();
        workers.retain(|worker| !worker.is_finished());
        workers.push(worker);
        true
    }

    fn on_finished(&self, index: usize, outcome: Result<R>) {
        let mut guard = self.state.lock();
        if guard.previous() == MapState::Final {
            guard.release();
            return;
        }

        let mut wake_producer = false;
        let node = match outcome {
            Ok(value) => Node::Done(value),
            Err(error) if !guard.failed => {
                guard.failed = true;
                wake_producer = core::mem::take(&mut guard.producer_parked);
                Node::Failed(error)
            }
            Err(error) => {
                warn!("map_concurrent: discarding selector error after the first: {}", error);
                Node::Skipped
            }
        };
        guard.nodes[index] = node;
        if self.ordering == MapOrdering::Completion {
            guard.ready.push_back(index);
        }
        self.notify(guard);

        if wake_producer {
            self.producer.set_result(());
        }
    }

    fn on_upstream_done(&self, error: Option<SluiceError>) {
        let mut guard = self.state.lock();
        if guard.previous() == MapState::Final {
            guard.release();
            return;
        }

        guard.upstream_done = true;
        match error {
            Some(error) if !guard.failed => {
                guard.failed = true;
                let index = guard.allocate(Node::Failed(error));
                guard.ready.push_back(index);
            }
            Some(error) => debug!("map_concurrent: discarding upstream error: {}", error),
            None => trace!("map_concurrent: upstream exhausted"),
        }
        self.notify(guard);
    }

    fn shutdown(&self) {
        let mut guard = self.state.lock();
        let previous = guard.previous();
        guard.clear();
        guard.producer_parked = false;
        guard.unlock(MapState::Final);

        self.internal.cancel();
        if previous == MapState::Accepting {
            self.consumer.set_result(());
        }
    }
}

async fn produce<T, R>(
    shared: Arc<Shared<R>>,
    upstream: BoxCursor<T>,
    selector: Selector<T, R>,
    cancel: CancellationToken,
) where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    loop {
        match shared.reserve() {
            Reserve::Available => {}
            Reserve::Full => {
                if cancel
                    .run_until_cancelled(shared.producer.wait())
                    .await
                    .is_none()
                {
                    shared.on_upstream_done(Some(SluiceError::Cancelled));
                    break;
                }
                continue;
            }
            Reserve::Stopped => break,
        }

        match pull(&upstream, &cancel).await {
            Pulled::Item(item) => {
                if !shared.dispatch(item, &selector) {
                    break;
                }
            }
            Pulled::Exhausted => {
                shared.on_upstream_done(None);
                break;
            }
            Pulled::Failed(error) => {
                shared.on_upstream_done(Some(error));
                break;
            }
            Pulled::Cancelled => {
                shared.on_upstream_done(Some(SluiceError::Cancelled));
                break;
            }
        }
    }
    upstream.close().await;
}

struct MapCursor<T, R> {
    shared: Arc<Shared<R>>,
    upstream: Mutex<Option<BoxCursor<T>>>,
    selector: Selector<T, R>,
    producer: Mutex<Option<SluiceTask>>,
    current: CurrentSlot<R>,
    gate: AdvanceGate,
}

impl<T, R> MapCursor<T, R>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn start(&self) {
        let Some(upstream) = self.upstream.lock().take() else {
            return;
        };
        let shared = self.shared.clone();
        let selector = self.selector.clone();
        let task = SluiceTask::spawn(&self.shared.internal, move |cancel| {
            produce(shared, upstream, selector, cancel)
        });
        *self.producer.lock() = Some(task);
    }
}

#[async_trait]
impl<T, R> AsyncCursor for MapCursor<T, R>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    type Item = R;

    async fn advance(&self) -> Result<bool> {
        let _ticket = self.gate.enter()?;
        self.current.clear();

        loop {
            if !self.shared.consumer.is_armed() {
                let mut guard = self.shared.state.lock();
                let previous = guard.previous();
                if previous == MapState::Final {
                    guard.release();
                    return Ok(false);
                }

                match guard.next_ready() {
                    Next::Item(value) => {
                        let wake = guard.producer_parked && guard.in_flight < self.shared.limit;
                        if wake {
                            guard.producer_parked = false;
                        }
                        guard.unlock(MapState::Idle);

                        if wake {
                            self.shared.producer.set_result(());
                        }
                        self.current.set(value);
                        return Ok(true);
                    }
                    Next::Failed(error) => {
                        guard.clear();
                        guard.unlock(MapState::Final);
                        self.shared.internal.cancel();
                        return Err(error);
                    }
                    Next::Exhausted => {
                        guard.unlock(MapState::Final);
                        return Ok(false);
                    }
                    Next::Pending => {
                        self.shared.consumer.arm();
                        guard.unlock(MapState::Accepting);
                        if previous == MapState::Initial {
                            self.start();
                        }
                    }
                }
            }

            self.shared.consumer.wait().await?;
        }
    }

    fn current(&self) -> Option<R> {
        self.current.get()
    }

    async fn close(&self) {
        self.shared.shutdown();
        self.current.clear();

        let upstream = self.upstream.lock().take();
        if let Some(upstream) = upstream {
            upstream.close().await;
        }

        let producer = self.producer.lock().take();
        if let Some(producer) = producer {
            producer.finished().await;
        }
        let workers = core::mem::take(&mut *self.shared.workers.lock());
        for worker in &workers {
            worker.finished().await;
        }
    }
}

impl<T, R> Drop for MapCursor<T, R> {
    fn drop(&mut self) {
        self.shared.internal.cancel();
    }
}
