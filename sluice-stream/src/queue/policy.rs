// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Buffering policies for the queue channel.
//!
//! A policy owns the buffered items and decides what happens on overflow. Policies are
//! plain values: each [`channel`](super::channel) (and each open of a
//! [`Buffer`](super::Buffer)) gets its own copy.

use sluice_core::{Result, SluiceError};
use std::collections::VecDeque;

/// Storage and overflow behavior of a queue.
///
/// The channel calls every method while holding its state lock, so implementations must not
/// block or call back into user code.
pub trait QueuePolicy: Send + 'static {
    /// What the producer enqueues.
    type Item: Send + 'static;
    /// What one `dequeue` hands to the consumer.
    type Unit: Clone + Send + 'static;

    /// Buffer `item`, possibly evicting or discarding items.
    ///
    /// # Errors
    ///
    /// Returns an error when the policy refuses the item. The channel treats this as
    /// terminal.
    fn enqueue(&mut self, item: Self::Item) -> Result<()>;

    /// Take the next unit, if any.
    fn dequeue(&mut self) -> Option<Self::Unit>;

    /// Take every buffered unit.
    fn dequeue_all(&mut self) -> Vec<Self::Unit> {
        let mut units = Vec::with_capacity(self.len());
        while let Some(unit) = self.dequeue() {
            units.push(unit);
        }
        units
    }

    fn is_empty(&self) -> bool;

    /// Buffered items, not units.
    fn len(&self) -> usize;

    /// `true` when the producer must wait instead of enqueueing.
    fn backpressure(&self) -> bool {
        false
    }

    /// Discard one unit. Used during teardown; returns `false` once the queue is empty.
    fn dequeue_fail_safe(&mut self) -> bool {
        self.dequeue().is_some()
    }

    /// Items discarded by overflow so far.
    fn dropped(&self) -> u64 {
        0
    }
}

fn checked_capacity(capacity: usize, policy: &str) -> Result<usize> {
    if capacity == 0 {
        Err(SluiceError::invalid_state(format!(
            "{policy} capacity must be at least 1"
        )))
    } else {
        Ok(capacity)
    }
}

/// Unbounded growth up to a hard cap; exceeding it fails the queue.
#[derive(Debug, Clone)]
pub struct ThrowOnFull<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> ThrowOnFull<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ThrowOnFull capacity must be at least 1");
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// # Errors
    ///
    /// Returns [`SluiceError::InvalidState`] if `capacity` is zero.
    pub fn try_new(capacity: usize) -> Result<Self> {
        checked_capacity(capacity, "ThrowOnFull").map(Self::new)
    }

    /// No cap at all.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }
}

impl<T: Clone + Send + 'static> QueuePolicy for ThrowOnFull<T> {
    type Item = T;
    type Unit = T;

    fn enqueue(&mut self, item: T) -> Result<()> {
        if self.items.len() >= self.capacity {
            return Err(SluiceError::resource_limit("queue", self.capacity));
        }
        self.items.push_back(item);
        Ok(())
    }

    fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Bounded and lossless: a full queue makes the producer wait.
#[derive(Debug, Clone)]
pub struct Backpressure<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Backpressure<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Backpressure capacity must be at least 1");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// # Errors
    ///
    /// Returns [`SluiceError::InvalidState`] if `capacity` is zero.
    pub fn try_new(capacity: usize) -> Result<Self> {
        checked_capacity(capacity, "Backpressure").map(Self::new)
    }
}

impl<T: Clone + Send + 'static> QueuePolicy for Backpressure<T> {
    type Item = T;
    type Unit = T;

    fn enqueue(&mut self, item: T) -> Result<()> {
        // The channel waits on `backpressure()` first; this only guards direct misuse.
        if self.items.len() >= self.capacity {
            return Err(SluiceError::resource_limit("queue", self.capacity));
        }
        self.items.push_back(item);
        Ok(())
    }

    fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn backpressure(&self) -> bool {
        self.items.len() >= self.capacity
    }
}

/// Lossy ring shared by the most/least-recent policies.
#[derive(Debug, Clone)]
struct Lossy<T> {
    items: VecDeque<T>,
    capacity: usize,
    keep_newest: bool,
    dropped: u64,
}

impl<T> Lossy<T> {
    fn new(capacity: usize, keep_newest: bool) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            keep_newest,
            dropped: 0,
        }
    }

    fn push(&mut self, item: T) {
        if self.items.len() < self.capacity {
            self.items.push_back(item);
            return;
        }

        self.dropped += 1;
        if self.keep_newest {
            self.items.pop_front();
            self.items.push_back(item);
            trace!("queue: evicted the oldest item, {} dropped so far", self.dropped);
        } else {
            trace!("queue: discarded the newest item, {} dropped so far", self.dropped);
        }
    }
}

macro_rules! lossy_policy {
    ($(#[$doc:meta])* $name:ident, $keep_newest:expr, single) => {
        lossy_policy!(@struct $(#[$doc])* $name, $keep_newest);

        impl<T: Clone + Send + 'static> QueuePolicy for $name<T> {
            type Item = T;
            type Unit = T;

            fn enqueue(&mut self, item: T) -> Result<()> {
                self.0.push(item);
                Ok(())
            }

            fn dequeue(&mut self) -> Option<T> {
                self.0.items.pop_front()
            }

            fn is_empty(&self) -> bool {
                self.0.items.is_empty()
            }

            fn len(&self) -> usize {
                self.0.items.len()
            }

            fn dropped(&self) -> u64 {
                self.0.dropped
            }
        }
    };
    ($(#[$doc:meta])* $name:ident, $keep_newest:expr, batch) => {
        lossy_policy!(@struct $(#[$doc])* $name, $keep_newest);

        impl<T: Clone + Send + 'static> QueuePolicy for $name<T> {
            type Item = T;
            type Unit = Vec<T>;

            fn enqueue(&mut self, item: T) -> Result<()> {
                self.0.push(item);
                Ok(())
            }

            fn dequeue(&mut self) -> Option<Vec<T>> {
                if self.0.items.is_empty() {
                    None
                } else {
                    Some(self.0.items.drain(..).collect())
                }
            }

            fn is_empty(&self) -> bool {
                self.0.items.is_empty()
            }

            fn len(&self) -> usize {
                self.0.items.len()
            }

            fn dropped(&self) -> u64 {
                self.0.dropped
            }
        }
    };
    (@struct $(#[$doc:meta])* $name:ident, $keep_newest:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name<T>(Lossy<T>);

        impl<T> $name<T> {
            /// # Panics
            ///
            /// Panics if `capacity` is zero.
            pub fn new(capacity: usize) -> Self {
                assert!(
                    capacity > 0,
                    concat!(stringify!($name), " capacity must be at least 1")
                );
                Self(Lossy::new(capacity, $keep_newest))
            }

            /// # Errors
            ///
            /// Returns [`SluiceError::InvalidState`] if `capacity` is zero.
            pub fn try_new(capacity: usize) -> Result<Self> {
                checked_capacity(capacity, stringify!($name)).map(Self::new)
            }
        }
    };
}

lossy_policy!(
    /// Keeps the newest `capacity` items, evicting the oldest pending one on overflow.
    MostRecent,
    true,
    single
);

lossy_policy!(
    /// Keeps the oldest `capacity` items, discarding new arrivals on overflow.
    LeastRecent,
    false,
    single
);

lossy_policy!(
    /// [`MostRecent`] delivering the whole buffer as one unit.
    MostRecentBatch,
    true,
    batch
);

lossy_policy!(
    /// [`LeastRecent`] delivering the whole buffer as one unit.
    LeastRecentBatch,
    false,
    batch
);
