// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::pull::{pull, Parking, Pulled};
use async_trait::async_trait;
use parking_lot::Mutex;
use sluice_core::{
    logical_state, AdvanceGate, AsyncCursor, AsyncSource, BoxCursor, BoxSource,
    CancellationToken, Completion, CurrentSlot, Result, SluiceError, SluiceTask, SpinState,
};
use std::sync::Arc;

logical_state! {
    enum ZipState {
        Initial = 0,
        Idle = 1,
        Accepting = 2,
        Errored = 3,
        Final = 4,
    }
}

/// Source zipping N sources of the same item type through a fallible selector.
pub struct Zip<T, F> {
    sources: Vec<BoxSource<T>>,
    selector: Arc<F>,
}

/// [`Zip`] yielding the raw rows.
pub type ZipAll<T> = Zip<T, fn(Vec<T>) -> Result<Vec<T>>>;

/// Zip `sources` into rows of their i-th items.
pub fn zip<S>(sources: Vec<S>) -> ZipAll<S::Item>
where
    S: AsyncSource,
{
    zip_with(sources, Ok as fn(Vec<S::Item>) -> Result<Vec<S::Item>>)
}

/// Zip `sources` and map every row through `selector`.
///
/// The selector runs on the consumer side of `advance()`, never inside the operator's
/// critical section. A selector error terminates the sequence.
pub fn zip_with<S, R, F>(sources: Vec<S>, selector: F) -> Zip<S::Item, F>
where
    S: AsyncSource,
    F: Fn(Vec<S::Item>) -> Result<R> + Send + Sync + 'static,
{
    Zip {
        sources: sources
            .into_iter()
            .map(|source| Arc::new(source) as BoxSource<S::Item>)
            .collect(),
        selector: Arc::new(selector),
    }
}

impl<T, R, F> AsyncSource for Zip<T, F>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(Vec<T>) -> Result<R> + Send + Sync + 'static,
{
    type Item = R;

    fn open(&self, cancel: CancellationToken) -> BoxCursor<R> {
        let internal = cancel.child_token();
        let upstreams: Vec<BoxCursor<T>> = self
            .sources
            .iter()
            .map(|source| source.open(internal.clone()))
            .collect();
        let shared = Arc::new(Shared::new(upstreams.len(), internal));

        Box::new(ZipCursor {
            shared,
            selector: self.selector.clone(),
            upstreams: Mutex::new(Some(upstreams)),
            tasks: Mutex::new(Vec::new()),
            current: CurrentSlot::new(),
            gate: AdvanceGate::new(),
        })
    }
}

struct ZipData<T> {
    values: Vec<Option<T>>,
    awaited: usize,
    error: Option<SluiceError>,
}

struct Shared<T> {
    state: SpinState<ZipState, ZipData<T>>,
    consumer: Parking<Option<Vec<T>>>,
    /// One per producer: set by the consumer to let the producer pull its next item.
    releases: Vec<Completion<()>>,
    internal: CancellationToken,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn new(arity: usize, internal: CancellationToken) -> Self {
        let releases: Vec<Completion<()>> = (0..arity).map(|_| Completion::new()).collect();
        releases.iter().for_each(Completion::reset);

        let initial = if arity == 0 {
            ZipState::Final
        } else {
            ZipState::Initial
        };

        Self {
            state: SpinState::new(
                initial,
                ZipData {
                    values: (0..arity).map(|_| None).collect(),
                    awaited: 0,
                    error: None,
                },
            ),
            consumer: Parking::new(),
            releases,
            internal,
        }
    }

    /// Store producer `index`'s item for the current round. Returns `false` when the
    /// producer must stop.
    fn on_next(&self, index: usize, value: T) -> bool {
        let mut guard = self.state.lock();
        if guard.previous() != ZipState::Accepting {
            guard.release();
            return false;
        }

        guard.values[index] = Some(value);
        self.releases[index].reset();
        guard.awaited -= 1;
        if guard.awaited > 0 {
            guard.release();
            return true;
        }

        let row: Vec<T> = guard.values.iter_mut().filter_map(Option::take).collect();
        guard.unlock(ZipState::Idle);
        self.consumer.set_result(Some(row));
        true
    }

    fn on_exhausted(&self) {
        let mut guard = self.state.lock();
        let previous = guard.previous();
        if matches!(previous, ZipState::Errored | ZipState::Final) {
            guard.release();
            return;
        }

        guard.values.iter_mut().for_each(|value| *value = None);
        guard.unlock(ZipState::Final);
        self.internal.cancel();
        if previous == ZipState::Accepting {
            self.consumer.set_result(None);
        }
    }

    fn on_error(&self, error: SluiceError) {
        let mut guard = self.state.lock();
        match guard.previous() {
            ZipState::Errored | ZipState::Final => {
                guard.release();
                debug!("zip: discarding error after termination: {}", error);
            }
            ZipState::Accepting => {
                guard.values.iter_mut().for_each(|value| *value = None);
                guard.unlock(ZipState::Final);
                self.internal.cancel();
                self.consumer.set_error(error);
            }
            ZipState::Initial | ZipState::Idle => {
                guard.error = Some(error);
                guard.unlock(ZipState::Errored);
                self.internal.cancel();
            }
        }
    }

    /// Move to `Final`, cancel the producers and release a parked `advance()`.
    fn shutdown(&self) {
        let mut guard = self.state.lock();
        let previous = guard.previous();
        guard.values.iter_mut().for_each(|value| *value = None);
        guard.error = None;
        guard.unlock(ZipState::Final);

        self.internal.cancel();
        if previous == ZipState::Accepting {
            self.consumer.set_result(None);
        }
    }
}

async fn produce<T>(
    shared: Arc<Shared<T>>,
    index: usize,
    upstream: BoxCursor<T>,
    cancel: CancellationToken,
) where
    T: Clone + Send + 'static,
{
    loop {
        if cancel
            .run_until_cancelled(shared.releases[index].wait())
            .await
            .is_none()
        {
            shared.on_error(SluiceError::Cancelled);
            break;
        }

        match pull(&upstream, &cancel).await {
            Pulled::Item(value) => {
                if !shared.on_next(index, value) {
                    break;
                }
            }
            Pulled::Exhausted => {
                trace!("zip: source {} exhausted", index);
                shared.on_exhausted();
                break;
            }
            Pulled::Failed(error) => {
                shared.on_error(error);
                break;
            }
            Pulled::Cancelled => {
                shared.on_error(SluiceError::Cancelled);
                break;
            }
        }
    }
    upstream.close().await;
}

struct ZipCursor<T, R, F> {
    shared: Arc<Shared<T>>,
    selector: Arc<F>,
    upstreams: Mutex<Option<Vec<BoxCursor<T>>>>,
    tasks: Mutex<Vec<SluiceTask>>,
    current: CurrentSlot<R>,
    gate: AdvanceGate,
}

impl<T, R, F> ZipCursor<T, R, F>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(Vec<T>) -> Result<R> + Send + Sync + 'static,
{
    fn start(&self) {
        let Some(upstreams) = self.upstreams.lock().take() else {
            return;
        };

        let mut tasks = self.tasks.lock();
        for (index, upstream) in upstreams.into_iter().enumerate() {
            let shared = self.shared.clone();
            tasks.push(SluiceTask::spawn(&self.shared.internal, move |cancel| {
                produce(shared, index, upstream, cancel)
            }));
        }
    }

    fn emit(&self, row: Vec<T>) -> Result<bool> {
        match (self.selector)(row) {
            Ok(item) => {
                self.current.set(item);
                Ok(true)
            }
            Err(error) => {
                self.shared.shutdown();
                Err(error)
            }
        }
    }
}

#[async_trait]
impl<T, R, F> AsyncCursor for ZipCursor<T, R, F>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(Vec<T>) -> Result<R> + Send + Sync + 'static,
{
    type Item = R;

    async fn advance(&self) -> Result<bool> {
        let _ticket = self.gate.enter()?;
        self.current.clear();

        if !self.shared.consumer.is_armed() {
            let mut guard = self.shared.state.lock();
            match guard.previous() {
                ZipState::Final => {
                    guard.release();
                    return Ok(false);
                }
                ZipState::Errored => {
                    let error = guard.error.take().unwrap_or(SluiceError::Cancelled);
                    guard.unlock(ZipState::Final);
                    return Err(error);
                }
                ZipState::Accepting => guard.release(),
                previous @ (ZipState::Initial | ZipState::Idle) => {
                    guard.awaited = self.shared.releases.len();
                    self.shared.consumer.arm();
                    guard.unlock(ZipState::Accepting);

                    if previous == ZipState::Initial {
                        self.start();
                    }
                    for release in &self.shared.releases {
                        release.set_result(());
                    }
                }
            }
        }

        match self.shared.consumer.wait().await? {
            Some(row) => self.emit(row),
            None => Ok(false),
        }
    }

    fn current(&self) -> Option<R> {
        self.current.get()
    }

    async fn close(&self) {
        self.shared.shutdown();
        self.current.clear();

        let upstreams = self.upstreams.lock().take();
        for upstream in upstreams.into_iter().flatten() {
            upstream.close().await;
        }

        let tasks = core::mem::take(&mut *self.tasks.lock());
        for task in &tasks {
            task.finished().await;
        }
    }
}

impl<T, R, F> Drop for ZipCursor<T, R, F> {
    fn drop(&mut self) {
        self.shared.internal.cancel();
    }
}
