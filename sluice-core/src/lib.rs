// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
//! Core machinery for pull-based async sequences.
//!
//! - [`AsyncSource`] / [`AsyncCursor`]: the open/advance/close protocol,
//! - [`SpinState`]: the spin-locked logical state every operator is built around,
//! - [`Completion`]: a reusable, resettable single-shot future,
//! - [`CancellationToken`] and [`SluiceTask`]: cooperative cancellation of producer loops,
//! - leaf sources ([`iter_source`], [`stream_source`], ...) and [`IntoStream`].

#[macro_use]
mod logging;

pub mod cancellation_token;
pub mod completion;
pub mod current_slot;
pub mod cursor;
pub mod into_stream;
pub mod sluice_task;
pub mod sources;
pub mod spin_state;

pub use self::cancellation_token::CancellationToken;
pub use self::completion::Completion;
pub use self::current_slot::{AdvanceGate, AdvanceTicket, CurrentSlot};
pub use self::cursor::{AsyncCursor, AsyncSource, BoxCursor, BoxSource};
pub use self::into_stream::IntoStream;
pub use self::sluice_task::SluiceTask;
pub use self::sources::{
    empty_source, error_source, iter_source, stream_source, EmptySource, ErrorSource, IterSource,
    OutcomeCursor, StreamSource,
};
pub use self::spin_state::{LogicalState, SpinGuard, SpinState};
pub use sluice_error::{IntoSluiceError, Result, ResultExt, SluiceError};
