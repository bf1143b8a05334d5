// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::policy::QueuePolicy;
use crate::pull::Parking;
use async_trait::async_trait;
use sluice_core::{
    logical_state, AdvanceGate, AsyncCursor, Completion, CurrentSlot, Result, SluiceError,
    SpinGuard, SpinState,
};
use std::sync::Arc;

logical_state! {
    enum QueueState {
        Idle = 0,
        Accepting = 1,
        /// The producer has finished; buffered units are still deliverable.
        Completed = 2,
        Final = 3,
    }
}

struct QueueData<P> {
    policy: P,
    error: Option<SluiceError>,
    producer_parked: bool,
}

struct Shared<P> {
    state: SpinState<QueueState, QueueData<P>>,
    consumer: Parking<()>,
    producer: Completion<()>,
}

impl<P: QueuePolicy> Shared<P> {
    fn notify(&self, guard: SpinGuard<'_, QueueState, QueueData<P>>, next: QueueState) {
        let previous = guard.previous();
        guard.unlock(next);
        if previous == QueueState::Accepting {
            self.consumer.set_result(());
        }
    }

    fn finish(&self, error: Option<SluiceError>) {
        let mut guard = self.state.lock();
        match guard.previous() {
            QueueState::Completed | QueueState::Final => guard.release(),
            QueueState::Idle | QueueState::Accepting => {
                guard.error = error;
                self.notify(guard, QueueState::Completed);
            }
        }
    }

    /// Consumer-side teardown: discard what is buffered and release both parties.
    fn shutdown(&self) {
        let mut guard = self.state.lock();
        let previous = guard.previous();
        if previous == QueueState::Final {
            guard.release();
            return;
        }

        let mut discarded = 0usize;
        while guard.policy.dequeue_fail_safe() {
            discarded += 1;
        }
        guard.error = None;
        let wake_producer = core::mem::take(&mut guard.producer_parked);
        guard.unlock(QueueState::Final);

        if discarded > 0 {
            debug!("queue: discarded {} buffered units on close", discarded);
        }
        if previous == QueueState::Accepting {
            self.consumer.set_result(());
        }
        if wake_producer {
            self.producer.set_result(());
        }
    }
}

/// Create a queue governed by `policy`.
///
/// Items pushed through the [`QueueSender`] are pulled, one policy unit at a time, from the
/// [`QueueCursor`].
pub fn channel<P: QueuePolicy>(policy: P) -> (QueueSender<P>, QueueCursor<P>) {
    let shared = Arc::new(Shared {
        state: SpinState::new(
            QueueState::Idle,
            QueueData {
                policy,
                error: None,
                producer_parked: false,
            },
        ),
        consumer: Parking::new(),
        producer: Completion::new(),
    });

    (
        QueueSender {
            shared: shared.clone(),
            finished: false,
        },
        QueueCursor {
            shared,
            current: CurrentSlot::new(),
            gate: AdvanceGate::new(),
        },
    )
}

/// Producing half of a queue channel.
///
/// Dropping the sender completes the queue.
pub struct QueueSender<P: QueuePolicy> {
    shared: Arc<Shared<P>>,
    finished: bool,
}

impl<P: QueuePolicy> QueueSender<P> {
    /// Push `item` into the queue, waiting while the policy signals backpressure.
    ///
    /// # Errors
    ///
    /// - the policy refused the item (the queue then terminates with that error),
    /// - the consumer closed the queue,
    /// - the queue was already completed.
    pub async fn enqueue(&mut self, item: P::Item) -> Result<()> {
        loop {
            let mut guard = self.shared.state.lock();
            match guard.previous() {
                QueueState::Final => {
                    guard.release();
                    return Err(SluiceError::invalid_state("queue closed by its consumer"));
                }
                QueueState::Completed => {
                    guard.release();
                    return Err(SluiceError::invalid_state("queue already completed"));
                }
                QueueState::Idle | QueueState::Accepting => {}
            }

            if guard.policy.backpressure() {
                // A parked cycle left behind by a dropped `enqueue` is still armed.
                if !guard.producer_parked {
                    guard.producer_parked = true;
                    self.shared.producer.reset();
                }
                guard.release();
                self.shared.producer.wait().await?;
                continue;
            }

            return match guard.policy.enqueue(item) {
                Ok(()) => {
                    self.shared.notify(guard, QueueState::Idle);
                    Ok(())
                }
                Err(error) => {
                    debug!("queue: enqueue refused: {}", error);
                    guard.error = Some(error.clone());
                    self.finished = true;
                    self.shared.notify(guard, QueueState::Completed);
                    Err(error)
                }
            };
        }
    }

    /// Signal the end of the sequence. Buffered units remain deliverable.
    pub fn complete(mut self) {
        self.finished = true;
        self.shared.finish(None);
    }

    /// Terminate the sequence with `error`, reported after the buffered units.
    pub fn fail(mut self, error: SluiceError) {
        self.finished = true;
        self.shared.finish(Some(error));
    }

    /// `true` once the consumer has closed its cursor.
    pub fn is_closed(&self) -> bool {
        let guard = self.shared.state.lock();
        let closed = guard.previous() == QueueState::Final;
        guard.release();
        closed
    }
}

impl<P: QueuePolicy> Drop for QueueSender<P> {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.finish(None);
        }
    }
}

/// Consuming half of a queue channel.
pub struct QueueCursor<P: QueuePolicy> {
    shared: Arc<Shared<P>>,
    current: CurrentSlot<P::Unit>,
    gate: AdvanceGate,
}

impl<P: QueuePolicy> QueueCursor<P> {
    /// Items the policy discarded so far.
    pub fn dropped(&self) -> u64 {
        let guard = self.shared.state.lock();
        let dropped = guard.policy.dropped();
        guard.release();
        dropped
    }

    /// Buffered items.
    pub fn len(&self) -> usize {
        let guard = self.shared.state.lock();
        let len = guard.policy.len();
        guard.release();
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<P: QueuePolicy> AsyncCursor for QueueCursor<P> {
    type Item = P::Unit;

    async fn advance(&self) -> Result<bool> {
        let _ticket = self.gate.enter()?;
        self.current.clear();

        loop {
            if !self.shared.consumer.is_armed() {
                let mut guard = self.shared.state.lock();
                let previous = guard.previous();
                if previous == QueueState::Final {
                    guard.release();
                    return Ok(false);
                }

                if let Some(unit) = guard.policy.dequeue() {
                    let wake = guard.producer_parked && !guard.policy.backpressure();
                    if wake {
                        guard.producer_parked = false;
                    }
                    guard.release();

                    if wake {
                        self.shared.producer.set_result(());
                    }
                    self.current.set(unit);
                    return Ok(true);
                }

                if previous == QueueState::Completed {
                    let error = guard.error.take();
                    guard.unlock(QueueState::Final);
                    return error.map_or(Ok(false), Err);
                }

                self.shared.consumer.arm();
                guard.unlock(QueueState::Accepting);
            }

            self.shared.consumer.wait().await?;
        }
    }

    fn current(&self) -> Option<P::Unit> {
        self.current.get()
    }

    async fn close(&self) {
        self.current.clear();
        self.shared.shutdown();
    }
}

impl<P: QueuePolicy> Drop for QueueCursor<P> {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}
