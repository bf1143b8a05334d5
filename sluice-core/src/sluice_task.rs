// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Runtime-agnostic producer loops with cooperative cancellation.
//!
//! Operators never own threads. A producer loop is handed to whatever runtime the
//! caller is already running on (Tokio by default, smol behind `runtime-smol`), and the
//! operator keeps a [`SluiceTask`] to cancel it and to wait for it to wind down.

use crate::CancellationToken;
use core::future::Future;
use core::sync::atomic::{AtomicBool, Ordering};
use event_listener::Event;
use std::sync::Arc;

#[cfg(not(any(feature = "runtime-tokio", feature = "runtime-smol")))]
compile_error!(
    "sluice-core spawns producer loops on a runtime: enable `runtime-tokio` or `runtime-smol`"
);

/// Handle to a spawned loop, cancelled automatically on drop.
///
/// The loop receives its own child of the token passed to [`spawn`](SluiceTask::spawn):
/// dropping or cancelling this handle stops only this loop, while cancelling the parent
/// stops every loop spawned under it.
///
/// # Example
///
/// ```rust
/// use sluice_core::{CancellationToken, SluiceTask};
///
/// # #[tokio::main]
/// # async fn main() {
/// let parent = CancellationToken::new();
/// let task = SluiceTask::spawn(&parent, |cancel| async move {
///     cancel.cancelled().await;
/// });
///
/// parent.cancel();
/// task.finished().await;
/// # }
/// ```
#[derive(Debug)]
pub struct SluiceTask {
    cancel: CancellationToken,
    finished: Arc<Finished>,
    detached: bool,
}

#[derive(Debug, Default)]
struct Finished {
    done: AtomicBool,
    event: Event,
}

struct SignalOnDrop(Arc<Finished>);

impl Drop for SignalOnDrop {
    fn drop(&mut self) {
        trace!("producer loop finished");
        self.0.done.store(true, Ordering::Release);
        self.0.event.notify(usize::MAX);
    }
}

impl SluiceTask {
    /// Spawn `f` on the configured runtime with a child of `parent`.
    pub fn spawn<F, Fut>(parent: &CancellationToken, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = parent.child_token();
        let finished = Arc::new(Finished::default());
        let signal = SignalOnDrop(finished.clone());
        let future = f(cancel.clone());

        let wrapped = async move {
            let _signal = signal;
            future.await;
        };

        #[cfg(feature = "runtime-tokio")]
        tokio::spawn(wrapped);

        #[cfg(all(feature = "runtime-smol", not(feature = "runtime-tokio")))]
        smol::spawn(wrapped).detach();

        Self {
            cancel,
            finished,
            detached: false,
        }
    }

    /// Signal the loop to stop. It exits at its next cancellation checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// `true` once `cancel()` was called, the handle was dropped or the parent was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `true` once the loop has returned (or was dropped by its runtime).
    pub fn is_finished(&self) -> bool {
        self.finished.done.load(Ordering::Acquire)
    }

    /// Wait until the loop has returned.
    pub async fn finished(&self) {
        loop {
            if self.is_finished() {
                return;
            }
            let listener = self.finished.event.listen();
            if self.is_finished() {
                return;
            }
            listener.await;
        }
    }

    /// Let the loop run to completion without this handle; only the parent token can stop it.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for SluiceTask {
    fn drop(&mut self) {
        if !self.detached {
            self.cancel.cancel();
        }
    }
}
