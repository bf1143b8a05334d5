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
    enum CombineState {
        Initial = 0,
        Idle = 1,
        Accepting = 2,
        Emitting = 3,
        Completed = 4,
        Errored = 5,
        Final = 6,
    }
}

/// Source recombining the latest values of N sources through a fallible selector.
pub struct CombineLatest<T, F> {
    sources: Vec<BoxSource<T>>,
    selector: Arc<F>,
}

/// [`CombineLatest`] yielding the raw combinations.
pub type CombineLatestAll<T> = CombineLatest<T, fn(Vec<T>) -> Result<Vec<T>>>;

/// Combine the latest values of `sources`, in source order.
pub fn combine_latest<S>(sources: Vec<S>) -> CombineLatestAll<S::Item>
where
    S: AsyncSource,
{
    combine_latest_with(sources, Ok as fn(Vec<S::Item>) -> Result<Vec<S::Item>>)
}

/// Combine the latest values of `sources` and map every combination through `selector`.
pub fn combine_latest_with<S, R, F>(sources: Vec<S>, selector: F) -> CombineLatest<S::Item, F>
where
    S: AsyncSource,
    F: Fn(Vec<S::Item>) -> Result<R> + Send + Sync + 'static,
{
    CombineLatest {
        sources: sources
            .into_iter()
            .map(|source| Arc::new(source) as BoxSource<S::Item>)
            .collect(),
        selector: Arc::new(selector),
    }
}

impl<T, R, F> AsyncSource for CombineLatest<T, F>
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

        Box::new(CombineLatestCursor {
            shared,
            selector: self.selector.clone(),
            upstreams: Mutex::new(Some(upstreams)),
            tasks: Mutex::new(Vec::new()),
            current: CurrentSlot::new(),
            gate: AdvanceGate::new(),
        })
    }
}

struct CombineData<T> {
    values: Vec<Option<T>>,
    /// Sources that have not produced yet.
    missing: usize,
    /// Sources that have not completed yet.
    active: usize,
    pending: Option<Vec<T>>,
    /// Producers waiting for the pending combination to be pulled.
    parked: Vec<usize>,
    error: Option<SluiceError>,
}

struct Shared<T> {
    state: SpinState<CombineState, CombineData<T>>,
    consumer: Parking<Option<Vec<T>>>,
    resumes: Vec<Completion<()>>,
    internal: CancellationToken,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn new(arity: usize, internal: CancellationToken) -> Self {
        let initial = if arity == 0 {
            CombineState::Final
        } else {
            CombineState::Initial
        };

        Self {
            state: SpinState::new(
                initial,
                CombineData {
                    values: (0..arity).map(|_| None).collect(),
                    missing: arity,
                    active: arity,
                    pending: None,
                    parked: Vec::with_capacity(arity),
                    error: None,
                },
            ),
            consumer: Parking::new(),
            resumes: (0..arity).map(|_| Completion::new()).collect(),
            internal,
        }
    }

    fn resume(&self, parked: Vec<usize>) {
        for index in parked {
            self.resumes[index].set_result(());
        }
    }

    /// Record an update from producer `index`. Returns `false` when the producer must stop;
    /// otherwise the producer parks on its resume completion.
    fn on_next(&self, index: usize, value: T) -> bool {
        let mut guard = self.state.lock();
        let previous = guard.previous();
        if matches!(
            previous,
            CombineState::Completed | CombineState::Errored | CombineState::Final
        ) {
            guard.release();
            return false;
        }

        if guard.values[index].replace(value).is_none() {
            guard.missing -= 1;
        }
        self.resumes[index].reset();
        guard.parked.push(index);

        if guard.missing > 0 {
            guard.release();
            return true;
        }

        let row: Vec<T> = guard.values.iter().flatten().cloned().collect();
        if previous == CombineState::Accepting {
            let parked = core::mem::take(&mut guard.parked);
            guard.unlock(CombineState::Idle);
            self.consumer.set_result(Some(row));
            self.resume(parked);
        } else {
            if guard.pending.replace(row).is_some() {
                trace!("combine_latest: overwrote an unconsumed combination");
            }
            guard.unlock(CombineState::Emitting);
        }
        true
    }

    fn on_completed(&self, index: usize) {
        let mut guard = self.state.lock();
        let previous = guard.previous();
        if matches!(
            previous,
            CombineState::Completed | CombineState::Errored | CombineState::Final
        ) {
            guard.release();
            return;
        }

        guard.active -= 1;
        let starved = guard.values[index].is_none();
        if !starved && guard.active > 0 {
            guard.release();
            return;
        }

        if starved {
            guard.pending = None;
            guard.parked.clear();
        }
        if previous == CombineState::Accepting {
            guard.unlock(CombineState::Final);
            self.consumer.set_result(None);
        } else {
            guard.unlock(CombineState::Completed);
        }

        if starved {
            debug!("combine_latest: source {} completed without producing", index);
            self.internal.cancel();
        }
    }

    fn on_error(&self, error: SluiceError) {
        let mut guard = self.state.lock();
        match guard.previous() {
            CombineState::Completed | CombineState::Errored | CombineState::Final => {
                guard.release();
                debug!("combine_latest: discarding error after termination: {}", error);
            }
            CombineState::Accepting => {
                guard.pending = None;
                guard.parked.clear();
                guard.unlock(CombineState::Final);
                self.internal.cancel();
                self.consumer.set_error(error);
            }
            CombineState::Initial | CombineState::Idle | CombineState::Emitting => {
                guard.pending = None;
                guard.parked.clear();
                guard.error = Some(error);
                guard.unlock(CombineState::Errored);
                self.internal.cancel();
            }
        }
    }

    fn shutdown(&self) {
        let mut guard = self.state.lock();
        let previous = guard.previous();
        guard.pending = None;
        guard.parked.clear();
        guard.error = None;
        guard.unlock(CombineState::Final);

        self.internal.cancel();
        if previous == CombineState::Accepting {
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
        match pull(&upstream, &cancel).await {
            Pulled::Item(value) => {
                if !shared.on_next(index, value) {
                    break;
                }
                if cancel
                    .run_until_cancelled(shared.resumes[index].wait())
                    .await
                    .is_none()
                {
                    shared.on_error(SluiceError::Cancelled);
                    break;
                }
            }
            Pulled::Exhausted => {
                shared.on_completed(index);
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

struct CombineLatestCursor<T, R, F> {
    shared: Arc<Shared<T>>,
    selector: Arc<F>,
    upstreams: Mutex<Option<Vec<BoxCursor<T>>>>,
    tasks: Mutex<Vec<SluiceTask>>,
    current: CurrentSlot<R>,
    gate: AdvanceGate,
}

impl<T, R, F> CombineLatestCursor<T, R, F>
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
impl<T, R, F> AsyncCursor for CombineLatestCursor<T, R, F>
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
            let previous = guard.previous();
            match previous {
                CombineState::Final => {
                    guard.release();
                    return Ok(false);
                }
                CombineState::Errored => {
                    let error = guard.error.take().unwrap_or(SluiceError::Cancelled);
                    guard.unlock(CombineState::Final);
                    return Err(error);
                }
                CombineState::Emitting | CombineState::Completed => {
                    match guard.pending.take() {
                        Some(row) => {
                            let parked = core::mem::take(&mut guard.parked);
                            let next = if previous == CombineState::Completed {
                                CombineState::Completed
                            } else {
                                CombineState::Idle
                            };
                            guard.unlock(next);
                            self.shared.resume(parked);
                            return self.emit(row);
                        }
                        None if previous == CombineState::Completed => {
                            guard.unlock(CombineState::Final);
                            return Ok(false);
                        }
                        None => {
                            self.shared.consumer.arm();
                            guard.unlock(CombineState::Accepting);
                        }
                    }
                }
                CombineState::Accepting => guard.release(),
                CombineState::Initial | CombineState::Idle => {
                    self.shared.consumer.arm();
                    guard.unlock(CombineState::Accepting);
                    if previous == CombineState::Initial {
                        self.start();
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

impl<T, R, F> Drop for CombineLatestCursor<T, R, F> {
    fn drop(&mut self) {
        self.shared.internal.cancel();
    }
}
