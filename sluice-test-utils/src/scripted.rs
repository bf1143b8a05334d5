// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Sources replaying a script of values, errors and pauses.

use async_trait::async_trait;
use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use sluice_core::{AdvanceGate, AsyncCursor, AsyncSource, BoxCursor, CancellationToken, CurrentSlot};
use sluice_error::{Result, SluiceError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One instruction of a [`ScriptedSource`].
#[derive(Debug, Clone)]
pub enum Step<T> {
    /// Yield a value.
    Value(T),
    /// Fail the cursor; the script ends here.
    Error(SluiceError),
    /// Sleep before the next step.
    Delay(Duration),
    /// Never make progress again; only cancellation or `close()` end the cursor.
    Pending,
}

impl<T> Step<T> {
    pub fn delay_ms(ms: u64) -> Self {
        Self::Delay(Duration::from_millis(ms))
    }
}

/// Source replaying the same script on every open.
#[derive(Debug, Clone)]
pub struct ScriptedSource<T> {
    steps: Arc<[Step<T>]>,
}

impl<T> ScriptedSource<T> {
    pub fn new(steps: Vec<Step<T>>) -> Self {
        Self {
            steps: steps.into(),
        }
    }
}

/// A source running `steps` in order.
pub fn scripted_source<T>(steps: Vec<Step<T>>) -> ScriptedSource<T> {
    ScriptedSource::new(steps)
}

/// Each value yielded after its own delay in milliseconds.
pub fn delayed_source<T>(items: Vec<(T, u64)>) -> ScriptedSource<T> {
    ScriptedSource::new(
        items
            .into_iter()
            .flat_map(|(item, ms)| [Step::delay_ms(ms), Step::Value(item)])
            .collect(),
    )
}

/// `items`, then `error`.
pub fn failing_source<T>(items: Vec<T>, error: SluiceError) -> ScriptedSource<T> {
    let mut steps: Vec<Step<T>> = items.into_iter().map(Step::Value).collect();
    steps.push(Step::Error(error));
    ScriptedSource::new(steps)
}

/// `items`, then silence until cancelled or closed.
pub fn pending_source<T>(items: Vec<T>) -> ScriptedSource<T> {
    let mut steps: Vec<Step<T>> = items.into_iter().map(Step::Value).collect();
    steps.push(Step::Pending);
    ScriptedSource::new(steps)
}

impl<T> AsyncSource for ScriptedSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    fn open(&self, cancel: CancellationToken) -> BoxCursor<T> {
        Box::new(ScriptedCursor {
            steps: Mutex::new(self.steps.iter().cloned().collect()),
            closing: cancel.child_token(),
            closed: AtomicBool::new(false),
            reported: AtomicBool::new(false),
            current: CurrentSlot::new(),
            gate: AdvanceGate::new(),
        })
    }
}

struct ScriptedCursor<T> {
    steps: Mutex<VecDeque<Step<T>>>,
    /// Cancelled by `close()` as well as by the opener's token.
    closing: CancellationToken,
    closed: AtomicBool,
    /// Cancellation is reported once; later advances see the end.
    reported: AtomicBool,
    current: CurrentSlot<T>,
    gate: AdvanceGate,
}

impl<T> ScriptedCursor<T> {
    fn interrupted(&self) -> Result<bool> {
        self.steps.lock().clear();
        if self.closed.load(Ordering::Acquire) || self.reported.swap(true, Ordering::AcqRel) {
            Ok(false)
        } else {
            Err(SluiceError::Cancelled)
        }
    }
}

#[async_trait]
impl<T> AsyncCursor for ScriptedCursor<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    async fn advance(&self) -> Result<bool> {
        let _ticket = self.gate.enter()?;
        self.current.clear();

        loop {
            if self.closing.is_cancelled() {
                return self.interrupted();
            }

            let step = self.steps.lock().pop_front();
            match step {
                None => return Ok(false),
                Some(Step::Value(value)) => {
                    self.current.set(value);
                    return Ok(true);
                }
                Some(Step::Error(error)) => {
                    self.steps.lock().clear();
                    return Err(error);
                }
                Some(Step::Delay(delay)) => {
                    let slept = self
                        .closing
                        .run_until_cancelled(tokio::time::sleep(delay))
                        .await;
                    if slept.is_none() {
                        return self.interrupted();
                    }
                }
                Some(Step::Pending) => {
                    self.steps.lock().push_front(Step::Pending);
                    self.closing.cancelled().await;
                    return self.interrupted();
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
    }
}
