// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::pull::{pull, Parking, Pulled};
use async_trait::async_trait;
use core::fmt::Debug;
use core::hash::Hash;
use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use sluice_core::{
    logical_state, AdvanceGate, AsyncCursor, AsyncSource, BoxCursor, CancellationToken,
    Completion, CurrentSlot, OutcomeCursor, Result, SluiceError, SluiceTask, SpinState,
};
use std::collections::HashMap;
use std::sync::Arc;

logical_state! {
    enum GroupByState {
        Initial = 0,
        Idle = 1,
        Accepting = 2,
        Emitting = 3,
        Completed = 4,
        Errored = 5,
        Final = 6,
    }
}

/// What happens to a group's key once the group's consumer closes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupRetention {
    /// The key stays bound to the closed group; its later items are discarded.
    #[default]
    KeepUntilComplete,
    /// The key is forgotten; a later item with that key surfaces a new group.
    RemoveOnClose,
}

type KeyFn<T, K> = Arc<dyn Fn(&T) -> Result<K> + Send + Sync>;

/// Source splitting `source` into one [`Group`] per key.
pub struct GroupBy<S: AsyncSource, K> {
    source: S,
    key_fn: KeyFn<S::Item, K>,
    retention: GroupRetention,
}

impl<S: AsyncSource, K> GroupBy<S, K> {
    pub(crate) fn new(source: S, key_fn: KeyFn<S::Item, K>) -> Self {
        Self {
            source,
            key_fn,
            retention: GroupRetention::default(),
        }
    }

    /// Choose what happens to a key when its group is closed.
    #[must_use]
    pub fn with_retention(mut self, retention: GroupRetention) -> Self {
        self.retention = retention;
        self
    }
}

impl<S, K> AsyncSource for GroupBy<S, K>
where
    S: AsyncSource,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    type Item = Group<K, S::Item>;

    fn open(&self, cancel: CancellationToken) -> BoxCursor<Self::Item> {
        let internal = cancel.child_token();
        let upstream = self.source.open(internal.clone());

        Box::new(GroupByCursor {
            shared: Arc::new(Shared::new(internal, self.retention)),
            upstream: Mutex::new(Some(upstream)),
            key_fn: self.key_fn.clone(),
            current: CurrentSlot::new(),
            gate: AdvanceGate::new(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GroupPhase {
    /// Surfaced (or about to be) but not opened yet.
    Fresh,
    Idle,
    /// Holds an item its consumer has not pulled yet.
    Ready,
    Accepting,
    /// Holds an upstream error its consumer has not pulled yet.
    Errored,
    Done,
}

struct GroupHandle<T> {
    consumer: Parking<Option<T>>,
    opened: AtomicBool,
}

struct GroupSlot<K, T> {
    key: K,
    phase: GroupPhase,
    item: Option<T>,
    error: Option<SluiceError>,
    handle: Arc<GroupHandle<T>>,
}

/// A surfaced group: slot index, key and the handle identifying the slot's occupant.
type Surfaced<K, T> = (usize, K, Arc<GroupHandle<T>>);

struct GroupByData<K, T> {
    /// `None` binds a key whose group is gone; its later items are discarded.
    keys: HashMap<K, Option<usize>>,
    /// Vacant slots are listed in `free` and reused by later groups.
    slots: Vec<Option<GroupSlot<K, T>>>,
    free: Vec<usize>,
    /// Group created while the outer consumer was not waiting.
    outer_pending: Option<usize>,
    /// Last group handed to the outer consumer, until it is opened.
    fresh: Option<usize>,
    /// Group whose slot holds the item the producer is waiting on.
    parked_on: Option<usize>,
    open_groups: usize,
    upstream_finished: bool,
    outer_closed: bool,
    error: Option<SluiceError>,
}

impl<K: Eq + Hash, T> GroupByData<K, T> {
    fn allocate(&mut self, slot: GroupSlot<K, T>) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }

    /// Slot `index`, provided it still belongs to the group behind `handle`.
    fn slot_mut(
        &mut self,
        index: usize,
        handle: &Arc<GroupHandle<T>>,
    ) -> Option<&mut GroupSlot<K, T>> {
        self.slots
            .get_mut(index)?
            .as_mut()
            .filter(|slot| Arc::ptr_eq(&slot.handle, handle))
    }

    /// Vacate slot `index`. Its key is forgotten or kept bound to nothing.
    fn vacate(&mut self, index: usize, forget_key: bool) {
        let Some(slot) = self.slots.get_mut(index).and_then(Option::take) else {
            return;
        };
        self.free.push(index);
        if self.keys.get(&slot.key) == Some(&Some(index)) {
            if forget_key {
                self.keys.remove(&slot.key);
            } else {
                self.keys.insert(slot.key, None);
            }
        }
    }

    /// Drop a surfaced but unopened group; its key keeps discarding items. Returns `true`
    /// when the producer was parked on it and must be resumed.
    fn abandon(&mut self, index: usize) -> bool {
        let fresh = matches!(
            self.slots.get(index),
            Some(Some(slot)) if slot.phase == GroupPhase::Fresh
        );
        if !fresh {
            return false;
        }

        self.vacate(index, false);
        debug!("group_by: group {} was not opened in time, discarding its items", index);
        self.take_parked(index)
    }

    fn take_parked(&mut self, index: usize) -> bool {
        if self.parked_on == Some(index) {
            self.parked_on = None;
            true
        } else {
            false
        }
    }
}

impl<K: Clone, T> GroupByData<K, T> {
    fn surfaced(&self, index: usize) -> Option<Surfaced<K, T>> {
        let slot = self.slots.get(index)?.as_ref()?;
        Some((index, slot.key.clone(), slot.handle.clone()))
    }
}

enum Delivery<T> {
    /// The producer may pull the next item.
    Continue,
    /// The item is parked in a group slot; wait for the producer completion.
    Park,
    /// Hand the item to a waiting group.
    Handoff(Arc<GroupHandle<T>>, T),
    Stop,
}

struct Shared<K, T> {
    state: SpinState<GroupByState, GroupByData<K, T>>,
    outer: Parking<Option<Surfaced<K, T>>>,
    producer: Completion<()>,
    internal: CancellationToken,
    retention: GroupRetention,
    task: Mutex<Option<SluiceTask>>,
}

impl<K, T> Shared<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    fn new(internal: CancellationToken, retention: GroupRetention) -> Self {
        Self {
            state: SpinState::new(
                GroupByState::Initial,
                GroupByData {
                    keys: HashMap::new(),
                    slots: Vec::new(),
                    free: Vec::new(),
                    outer_pending: None,
                    fresh: None,
                    parked_on: None,
                    open_groups: 0,
                    upstream_finished: false,
                    outer_closed: false,
                    error: None,
                },
            ),
            outer: Parking::new(),
            producer: Completion::new(),
            internal,
            retention,
            task: Mutex::new(None),
        }
    }

    fn route(&self, key: K, item: T) -> Delivery<T> {
        let mut guard = self.state.lock();
        let previous = guard.previous();
        if guard.upstream_finished {
            guard.release();
            return Delivery::Stop;
        }

        let data = &mut *guard;
        let binding = data.keys.get(&key).copied();
        if let Some(binding) = binding {
            let Some(index) = binding else {
                guard.release();
                trace!("group_by: discarding item for a closed group");
                return Delivery::Continue;
            };
            let Some(slot) = data.slots.get_mut(index).and_then(Option::as_mut) else {
                guard.release();
                return Delivery::Continue;
            };
            let delivery = match slot.phase {
                GroupPhase::Accepting => {
                    slot.phase = GroupPhase::Idle;
                    Delivery::Handoff(slot.handle.clone(), item)
                }
                GroupPhase::Idle | GroupPhase::Fresh => {
                    slot.item = Some(item);
                    if slot.phase == GroupPhase::Idle {
                        slot.phase = GroupPhase::Ready;
                    }
                    data.parked_on = Some(index);
                    self.producer.reset();
                    Delivery::Park
                }
                phase => {
                    trace!("group_by: discarding item for group {} in phase {:?}", index, phase);
                    Delivery::Continue
                }
            };
            guard.release();
            return delivery;
        }

        if data.outer_closed {
            guard.release();
            trace!("group_by: outer cursor closed, discarding item for a new key");
            return Delivery::Continue;
        }

        let handle = Arc::new(GroupHandle {
            consumer: Parking::new(),
            opened: AtomicBool::new(false),
        });
        let index = data.allocate(GroupSlot {
            key: key.clone(),
            phase: GroupPhase::Fresh,
            item: Some(item),
            error: None,
            handle: handle.clone(),
        });
        data.keys.insert(key.clone(), Some(index));
        data.parked_on = Some(index);
        self.producer.reset();

        if previous == GroupByState::Accepting {
            data.fresh = Some(index);
            guard.unlock(GroupByState::Idle);
            self.outer.set_result(Some((index, key, handle)));
        } else {
            data.outer_pending = Some(index);
            guard.unlock(GroupByState::Emitting);
        }
        Delivery::Park
    }

    fn on_completed(&self) {
        let mut wakes = Vec::new();
        let mut guard = self.state.lock();
        let previous = guard.previous();
        if guard.upstream_finished {
            guard.release();
            return;
        }

        guard.upstream_finished = true;
        for slot in guard.slots.iter_mut().flatten() {
            match slot.phase {
                GroupPhase::Accepting => {
                    slot.phase = GroupPhase::Done;
                    wakes.push(slot.handle.clone());
                }
                GroupPhase::Idle => slot.phase = GroupPhase::Done,
                _ => {}
            }
        }

        let wake_outer = previous == GroupByState::Accepting;
        let next = match previous {
            GroupByState::Accepting | GroupByState::Final => GroupByState::Final,
            GroupByState::Emitting => GroupByState::Emitting,
            _ => GroupByState::Completed,
        };
        guard.unlock(next);

        for handle in wakes {
            handle.consumer.set_result(None);
        }
        if wake_outer {
            self.outer.set_result(None);
        }
    }

    fn on_error(&self, error: SluiceError) {
        let mut wakes = Vec::new();
        let mut guard = self.state.lock();
        let previous = guard.previous();
        if guard.upstream_finished {
            guard.release();
            debug!("group_by: discarding error after termination: {}", error);
            return;
        }

        guard.upstream_finished = true;
        guard.parked_on = None;
        guard.outer_pending = None;
        for slot in guard.slots.iter_mut().flatten() {
            match slot.phase {
                GroupPhase::Accepting => {
                    slot.phase = GroupPhase::Done;
                    wakes.push(slot.handle.clone());
                }
                GroupPhase::Idle | GroupPhase::Ready | GroupPhase::Fresh => {
                    slot.item = None;
                    slot.error = Some(error.clone());
                    slot.phase = GroupPhase::Errored;
                }
                _ => {}
            }
        }

        let mut outer_error = None;
        match previous {
            GroupByState::Accepting => {
                outer_error = Some(error.clone());
                guard.unlock(GroupByState::Final);
            }
            GroupByState::Final => guard.release(),
            _ => {
                guard.error = Some(error.clone());
                guard.unlock(GroupByState::Errored);
            }
        }

        for handle in wakes {
            handle.consumer.set_error(error.clone());
        }
        if let Some(error) = outer_error {
            self.outer.set_error(error);
        }
    }

    /// Open group `index`, unless its slot was given up in the meantime.
    fn open_group(
        self: &Arc<Self>,
        index: usize,
        handle: Arc<GroupHandle<T>>,
        cancel: CancellationToken,
    ) -> BoxCursor<T> {
        let mut guard = self.state.lock();
        let data = &mut *guard;
        let upstream_finished = data.upstream_finished;
        let Some(slot) = data.slot_mut(index, &handle) else {
            guard.release();
            debug!("group_by: group {} opened too late", index);
            return Box::new(OutcomeCursor::new(Some(SluiceError::GroupOpenedTooLate)));
        };

        if slot.phase == GroupPhase::Fresh {
            slot.phase = if slot.item.is_some() {
                GroupPhase::Ready
            } else if upstream_finished {
                GroupPhase::Done
            } else {
                GroupPhase::Idle
            };
        }
        data.open_groups += 1;
        if data.fresh == Some(index) {
            data.fresh = None;
        }
        guard.release();

        Box::new(GroupCursor {
            shared: self.clone(),
            index,
            handle,
            cancel,
            cancelled: AtomicBool::new(false),
            current: CurrentSlot::new(),
            gate: AdvanceGate::new(),
        })
    }
}

impl<K: Eq + Hash, T> Shared<K, T> {
    /// Close the outer side. Returns the producer task when no group keeps it alive.
    fn close_outer(&self) -> Option<SluiceTask> {
        let mut guard = self.state.lock();
        let previous = guard.previous();
        if guard.outer_closed {
            guard.release();
            return None;
        }

        guard.outer_closed = true;
        guard.error = None;
        let mut resume = false;
        if let Some(index) = guard.outer_pending.take() {
            resume |= guard.abandon(index);
        }
        if let Some(index) = guard.fresh.take() {
            resume |= guard.abandon(index);
        }
        let idle = guard.open_groups == 0;
        guard.unlock(GroupByState::Final);

        if previous == GroupByState::Accepting {
            self.outer.set_result(None);
        }
        if resume {
            self.producer.set_result(());
        }
        if idle {
            self.internal.cancel();
            return self.task.lock().take();
        }
        None
    }

    /// Detach group `index` from the upstream and vacate its slot. Returns the producer task
    /// when this was the last group keeping a closed outer cursor's upstream alive.
    fn detach_group(&self, index: usize, handle: &Arc<GroupHandle<T>>) -> Option<SluiceTask> {
        let mut guard = self.state.lock();
        let data = &mut *guard;
        let Some(slot) = data.slot_mut(index, handle) else {
            guard.release();
            return None;
        };

        let wake = slot.phase == GroupPhase::Accepting;
        data.open_groups -= 1;
        data.vacate(index, self.retention == GroupRetention::RemoveOnClose);
        let resume = data.take_parked(index);
        let idle = data.outer_closed && data.open_groups == 0;
        guard.release();

        if wake {
            handle.consumer.set_result(None);
        }
        if resume {
            self.producer.set_result(());
        }
        if idle {
            self.internal.cancel();
            return self.task.lock().take();
        }
        None
    }
}

async fn produce<K, T>(
    shared: Arc<Shared<K, T>>,
    upstream: BoxCursor<T>,
    key_fn: KeyFn<T, K>,
    cancel: CancellationToken,
) where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    loop {
        let item = match pull(&upstream, &cancel).await {
            Pulled::Item(item) => item,
            Pulled::Exhausted => {
                shared.on_completed();
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
        };

        let key = match key_fn(&item) {
            Ok(key) => key,
            Err(error) => {
                shared.on_error(error);
                break;
            }
        };

        match shared.route(key, item) {
            Delivery::Continue => {}
            Delivery::Handoff(handle, item) => handle.consumer.set_result(Some(item)),
            Delivery::Park => {
                if cancel.run_until_cancelled(shared.producer.wait()).await.is_none() {
                    shared.on_error(SluiceError::Cancelled);
                    break;
                }
            }
            Delivery::Stop => break,
        }
    }
    upstream.close().await;
}

/// One key's share of a grouped sequence.
///
/// A group is a source that can be opened exactly once, and only right after the outer
/// cursor surfaced it.
pub struct Group<K, T> {
    key: K,
    index: usize,
    handle: Arc<GroupHandle<T>>,
    shared: Arc<Shared<K, T>>,
}

impl<K, T> Group<K, T> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Clone, T> Clone for Group<K, T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            index: self.index,
            handle: self.handle.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<K: Debug, T> Debug for Group<K, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Group")
            .field("key", &self.key)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl<K, T> AsyncSource for Group<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    type Item = T;

    fn open(&self, cancel: CancellationToken) -> BoxCursor<T> {
        if self.handle.opened.swap(true, Ordering::AcqRel) {
            return Box::new(OutcomeCursor::new(Some(SluiceError::already_opened(
                "group_by group",
            ))));
        }
        self.shared.open_group(self.index, self.handle.clone(), cancel)
    }
}

struct GroupByCursor<K: Eq + Hash, T> {
    shared: Arc<Shared<K, T>>,
    upstream: Mutex<Option<BoxCursor<T>>>,
    key_fn: KeyFn<T, K>,
    current: CurrentSlot<Group<K, T>>,
    gate: AdvanceGate,
}

impl<K, T> GroupByCursor<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    fn start(&self) {
        let Some(upstream) = self.upstream.lock().take() else {
            return;
        };
        let shared = self.shared.clone();
        let key_fn = self.key_fn.clone();
        let task = SluiceTask::spawn(&self.shared.internal, move |cancel| {
            produce(shared, upstream, key_fn, cancel)
        });
        *self.shared.task.lock() = Some(task);
    }

    fn surface(&self, (index, key, handle): Surfaced<K, T>) -> bool {
        self.current.set(Group {
            key,
            index,
            handle,
            shared: self.shared.clone(),
        });
        true
    }
}

#[async_trait]
impl<K, T> AsyncCursor for GroupByCursor<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    type Item = Group<K, T>;

    async fn advance(&self) -> Result<bool> {
        let _ticket = self.gate.enter()?;
        self.current.clear();

        if !self.shared.outer.is_armed() {
            let mut guard = self.shared.state.lock();
            let previous = guard.previous();
            let resume = match guard.fresh.take() {
                Some(index) => guard.abandon(index),
                None => false,
            };

            let outcome = match previous {
                GroupByState::Final => {
                    guard.release();
                    Some(Ok(false))
                }
                GroupByState::Completed => {
                    guard.unlock(GroupByState::Final);
                    Some(Ok(false))
                }
                GroupByState::Errored => {
                    let error = guard.error.take().unwrap_or(SluiceError::Cancelled);
                    guard.unlock(GroupByState::Final);
                    Some(Err(error))
                }
                GroupByState::Emitting => {
                    let pending = guard.outer_pending.take();
                    match pending.and_then(|index| guard.surfaced(index)) {
                        Some(surfaced) => {
                            guard.fresh = Some(surfaced.0);
                            let next = if guard.upstream_finished {
                                GroupByState::Completed
                            } else {
                                GroupByState::Idle
                            };
                            guard.unlock(next);
                            Some(Ok(self.surface(surfaced)))
                        }
                        None => {
                            self.shared.outer.arm();
                            guard.unlock(GroupByState::Accepting);
                            None
                        }
                    }
                }
                GroupByState::Accepting => {
                    guard.release();
                    None
                }
                GroupByState::Initial | GroupByState::Idle => {
                    self.shared.outer.arm();
                    guard.unlock(GroupByState::Accepting);
                    if previous == GroupByState::Initial {
                        self.start();
                    }
                    None
                }
            };

            if resume {
                self.shared.producer.set_result(());
            }
            if let Some(outcome) = outcome {
                return outcome;
            }
        }

        match self.shared.outer.wait().await? {
            Some(surfaced) => Ok(self.surface(surfaced)),
            None => Ok(false),
        }
    }

    fn current(&self) -> Option<Group<K, T>> {
        self.current.get()
    }

    async fn close(&self) {
        self.current.clear();
        let task = self.shared.close_outer();

        let upstream = self.upstream.lock().take();
        if let Some(upstream) = upstream {
            upstream.close().await;
        }
        if let Some(task) = task {
            task.finished().await;
        }
    }
}

impl<K: Eq + Hash, T> Drop for GroupByCursor<K, T> {
    fn drop(&mut self) {
        // Open groups keep the upstream alive on their own.
        drop(self.shared.close_outer());
    }
}

struct GroupCursor<K: Eq + Hash, T> {
    shared: Arc<Shared<K, T>>,
    index: usize,
    handle: Arc<GroupHandle<T>>,
    cancel: CancellationToken,
    /// Set once the cancellation was reported; later advances report exhaustion.
    cancelled: AtomicBool,
    current: CurrentSlot<T>,
    gate: AdvanceGate,
}

#[async_trait]
impl<K, T> AsyncCursor for GroupCursor<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    type Item = T;

    async fn advance(&self) -> Result<bool> {
        let _ticket = self.gate.enter()?;
        self.current.clear();
        if self.cancelled.load(Ordering::Acquire) {
            return Ok(false);
        }

        if !self.handle.consumer.is_armed() {
            let mut guard = self.shared.state.lock();
            let data = &mut *guard;
            let upstream_finished = data.upstream_finished;
            let Some(slot) = data.slot_mut(self.index, &self.handle) else {
                guard.release();
                return Ok(false);
            };
            match slot.phase {
                GroupPhase::Ready => {
                    let item = slot.item.take();
                    slot.phase = if upstream_finished {
                        GroupPhase::Done
                    } else {
                        GroupPhase::Idle
                    };
                    let resume = data.take_parked(self.index);
                    guard.release();

                    if resume {
                        self.shared.producer.set_result(());
                    }
                    return Ok(match item {
                        Some(item) => {
                            self.current.set(item);
                            true
                        }
                        None => false,
                    });
                }
                GroupPhase::Errored => {
                    let error = slot.error.take().unwrap_or(SluiceError::Cancelled);
                    slot.phase = GroupPhase::Done;
                    guard.release();
                    return Err(error);
                }
                GroupPhase::Idle => {
                    slot.phase = GroupPhase::Accepting;
                    self.handle.consumer.arm();
                    guard.release();
                }
                GroupPhase::Accepting => guard.release(),
                GroupPhase::Fresh | GroupPhase::Done => {
                    guard.release();
                    return Ok(false);
                }
            }
        }

        match self.cancel.run_until_cancelled(self.handle.consumer.wait()).await {
            Some(Ok(Some(item))) => {
                self.current.set(item);
                Ok(true)
            }
            Some(Ok(None)) => Ok(false),
            Some(Err(error)) => Err(error),
            None => {
                self.cancelled.store(true, Ordering::Release);
                drop(self.shared.detach_group(self.index, &self.handle));
                Err(SluiceError::Cancelled)
            }
        }
    }

    fn current(&self) -> Option<T> {
        self.current.get()
    }

    async fn close(&self) {
        self.current.clear();
        let task = self.shared.detach_group(self.index, &self.handle);
        if let Some(task) = task {
            task.finished().await;
        }
    }
}

impl<K: Eq + Hash, T> Drop for GroupCursor<K, T> {
    fn drop(&mut self) {
        // The loop was already cancelled when this returns a task.
        drop(self.shared.detach_group(self.index, &self.handle));
    }
}
