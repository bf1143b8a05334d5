// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use sluice_error::{Result, SluiceError};

/// Holder for the value a cursor exposes through `current()`.
///
/// Written only by the consumer side of a cursor, so it never participates in the
/// operator's state machine.
#[derive(Debug)]
pub struct CurrentSlot<T> {
    value: Mutex<Option<T>>,
}

impl<T: Clone> CurrentSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    pub fn set(&self, value: T) {
        *self.value.lock() = Some(value);
    }

    pub fn clear(&self) {
        *self.value.lock() = None;
    }

    pub fn get(&self) -> Option<T> {
        self.value.lock().clone()
    }
}

impl<T: Clone> Default for CurrentSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Enforces "at most one `advance()` in flight" for a cursor.
#[derive(Debug, Default)]
pub struct AdvanceGate {
    busy: AtomicBool,
}

impl AdvanceGate {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Claim the gate for the duration of one `advance()`.
    ///
    /// # Errors
    /// Returns [`SluiceError::ConcurrentAdvance`] when another `advance()` holds the gate.
    pub fn enter(&self) -> Result<AdvanceTicket<'_>> {
        if self.busy.swap(true, Ordering::Acquire) {
            return Err(SluiceError::ConcurrentAdvance);
        }
        Ok(AdvanceTicket { gate: self })
    }
}

/// Releases its [`AdvanceGate`] when dropped, including when the advance future is dropped.
#[derive(Debug)]
pub struct AdvanceTicket<'a> {
    gate: &'a AdvanceGate,
}

impl Drop for AdvanceTicket<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}
