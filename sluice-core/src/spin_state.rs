// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Spin-locked state field shared by every operator.
//!
//! A [`SpinState`] couples one atomic integer, the operator's *logical state*, with the
//! operator data that the state governs. [`SpinState::lock`] swaps a reserved
//! [`LOCKED`] marker into the integer and hands back the previous logical state; the
//! holder inspects it, mutates the data and stores the next state with
//! [`SpinGuard::unlock`]. Nobody else can observe or change either while the marker is
//! in place.
//!
//! Handlers follow one template:
//!
//! 1. `lock()` and match on the previous state,
//! 2. compute the next state and mutate the data,
//! 3. `unlock(next)`,
//! 4. only then perform visible side effects (completing a future, waking a producer).
//!
//! Critical sections never run user code and never await, so a busy-retry loop is
//! cheaper than a parking mutex and cannot self-deadlock between continuations that
//! happen to share a thread.
//!
//! ```
//! use sluice_core::logical_state;
//! use sluice_core::spin_state::SpinState;
//!
//! logical_state! {
//!     enum Door {
//!         Closed = 0,
//!         Open = 1,
//!     }
//! }
//!
//! let door = SpinState::new(Door::Closed, 0_u32);
//! let mut guard = door.lock();
//! assert_eq!(guard.previous(), Door::Closed);
//! *guard += 1;
//! guard.unlock(Door::Open);
//!
//! assert_eq!(door.snapshot(), Some(Door::Open));
//! ```

use core::cell::UnsafeCell;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};
use spin::relax::{RelaxStrategy, Spin};

/// Raw value reserved for "currently locked". Never a valid logical state.
pub const LOCKED: u32 = u32::MAX;

/// A small finite set of states encoded into the shared integer.
pub trait LogicalState: Copy + Eq + Debug {
    /// Encode the state. Must never return [`LOCKED`].
    fn to_raw(self) -> u32;

    /// Decode a value previously produced by [`to_raw`](LogicalState::to_raw).
    fn from_raw(raw: u32) -> Self;
}

/// Declares a `#[repr(u32)]` state enum implementing [`LogicalState`].
#[macro_export]
macro_rules! logical_state {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        #[repr(u32)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $crate::spin_state::LogicalState for $name {
            fn to_raw(self) -> u32 {
                self as u32
            }

            fn from_raw(raw: u32) -> Self {
                $(
                    if raw == $value {
                        return Self::$variant;
                    }
                )+
                unreachable!("invalid raw value {} for {}", raw, stringify!($name))
            }
        }
    };
}

/// A logical state plus the data it guards, behind a spin lock.
pub struct SpinState<S, D> {
    raw: AtomicU32,
    data: UnsafeCell<D>,
    _state: PhantomData<fn() -> S>,
}

// SAFETY: `data` is only reachable through a `SpinGuard`, and at most one guard exists at a
// time because acquiring one requires swapping a non-LOCKED value out of `raw`.
unsafe impl<S, D: Send> Send for SpinState<S, D> {}
// SAFETY: see above; shared access never hands out `&D` without holding the lock.
unsafe impl<S, D: Send> Sync for SpinState<S, D> {}

impl<S: LogicalState, D> SpinState<S, D> {
    /// Create an unlocked state field.
    pub fn new(initial: S, data: D) -> Self {
        let raw = initial.to_raw();
        debug_assert_ne!(raw, LOCKED, "logical state collides with the LOCKED marker");
        Self {
            raw: AtomicU32::new(raw),
            data: UnsafeCell::new(data),
            _state: PhantomData,
        }
    }

    /// Claim the field, spinning while another caller holds it.
    pub fn lock(&self) -> SpinGuard<'_, S, D> {
        loop {
            let raw = self.raw.swap(LOCKED, Ordering::Acquire);
            if raw != LOCKED {
                return SpinGuard {
                    owner: self,
                    previous: S::from_raw(raw),
                    released: false,
                };
            }
            while self.raw.load(Ordering::Relaxed) == LOCKED {
                Spin::relax();
            }
        }
    }

    /// Racy read of the logical state, `None` while someone holds the lock.
    ///
    /// Only meaningful for diagnostics and tests.
    pub fn snapshot(&self) -> Option<S> {
        match self.raw.load(Ordering::Acquire) {
            LOCKED => None,
            raw => Some(S::from_raw(raw)),
        }
    }

    /// Exclusive access without locking, available when the field isn't shared.
    pub fn get_mut(&mut self) -> &mut D {
        self.data.get_mut()
    }
}

impl<S: LogicalState, D> Debug for SpinState<S, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpinState")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a [`SpinState`].
///
/// Dropping the guard without calling [`unlock`](SpinGuard::unlock) restores the
/// previous logical state, so a panic inside a critical section leaves a legal state.
pub struct SpinGuard<'a, S: LogicalState, D> {
    owner: &'a SpinState<S, D>,
    previous: S,
    released: bool,
}

impl<S: LogicalState, D> SpinGuard<'_, S, D> {
    /// The logical state that was in place when the lock was taken.
    pub fn previous(&self) -> S {
        self.previous
    }

    /// Publish `next` and release the lock.
    pub fn unlock(mut self, next: S) {
        let raw = next.to_raw();
        debug_assert_ne!(raw, LOCKED, "logical state collides with the LOCKED marker");
        self.owner.raw.store(raw, Ordering::Release);
        self.released = true;
    }

    /// Release the lock keeping the previous logical state.
    pub fn release(self) {
        let previous = self.previous;
        self.unlock(previous);
    }
}

impl<S: LogicalState, D> Deref for SpinGuard<'_, S, D> {
    type Target = D;

    fn deref(&self) -> &D {
        // SAFETY: the guard is the unique holder of the lock.
        unsafe { &*self.owner.data.get() }
    }
}

impl<S: LogicalState, D> DerefMut for SpinGuard<'_, S, D> {
    fn deref_mut(&mut self) -> &mut D {
        // SAFETY: the guard is the unique holder of the lock.
        unsafe { &mut *self.owner.data.get() }
    }
}

impl<S: LogicalState, D> Drop for SpinGuard<'_, S, D> {
    fn drop(&mut self) {
        if !self.released {
            self.owner
                .raw
                .store(self.previous.to_raw(), Ordering::Release);
        }
    }
}
