// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions)]
//! Error types for the Sluice async cursor library
//!
//! Every cursor in the workspace reports failures through [`SluiceError`]. The variants
//! fall into three families that callers usually want to tell apart:
//!
//! - **usage errors**: the caller broke the cursor protocol (a second concurrent
//!   `advance()`, a fan-out group opened too late or twice). These are programming
//!   errors and are never produced by data.
//! - **data errors**: a user selector, key function or upstream producer failed, or a
//!   throw-on-full queue overflowed. They terminate the sequence.
//! - **cancellation**: the token the cursor was opened with fired. It propagates like a
//!   data error but stays distinguishable so a composed operator never masks it.
//!
//! # Examples
//!
//! ```
//! use sluice_error::{SluiceError, Result};
//!
//! fn pull() -> Result<bool> {
//!     Err(SluiceError::ConcurrentAdvance)
//! }
//!
//! assert!(pull().unwrap_err().is_usage_error());
//! ```

/// Root error type for all Sluice operations
#[derive(Debug, thiserror::Error)]
pub enum SluiceError {
    /// `advance()` was called while a previous `advance()` on the same cursor was still pending.
    #[error("advance() called while a previous advance() is still pending")]
    ConcurrentAdvance,

    /// A group surfaced by `group_by` was not opened before the outer cursor moved on.
    ///
    /// Items routed to the group in the meantime were discarded.
    #[error("group was opened too late: its items have already been discarded")]
    GroupOpenedTooLate,

    /// A single-use source was opened a second time.
    #[error("source already opened: {context}")]
    AlreadyOpened {
        /// Which source refused the second open
        context: String,
    },

    /// Invalid state or configuration encountered
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the invalid state
        message: String,
    },

    /// Stream processing encountered an error
    ///
    /// This is a general error for operators that don't fit other specific categories.
    #[error("Stream processing error: {context}")]
    StreamProcessingError {
        /// Description of what went wrong during stream processing
        context: String,
    },

    /// Resource limit exceeded
    ///
    /// Raised by throw-on-full queues when an enqueue would exceed their hard cap.
    #[error("Resource limit exceeded: {resource} (limit: {limit})")]
    ResourceLimitExceeded {
        /// Name of the resource that hit its limit
        resource: String,
        /// The limit that was exceeded
        limit: usize,
    },

    /// Custom error from user code
    ///
    /// Wraps errors produced by selectors, key functions and other user callbacks.
    #[error("User error: {0}")]
    UserError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The cancellation token the cursor was opened with has fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl SluiceError {
    /// Create an already-opened error with the given context
    pub fn already_opened(context: impl Into<String>) -> Self {
        Self::AlreadyOpened {
            context: context.into(),
        }
    }

    /// Create an invalid state error with the given message
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a stream processing error with the given context
    pub fn stream_error(context: impl Into<String>) -> Self {
        Self::StreamProcessingError {
            context: context.into(),
        }
    }

    /// Create a resource limit exceeded error
    pub fn resource_limit(resource: impl Into<String>, limit: usize) -> Self {
        Self::ResourceLimitExceeded {
            resource: resource.into(),
            limit,
        }
    }

    /// Wrap a user error
    pub fn user_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::UserError(Box::new(error))
    }

    /// `true` for protocol violations by the caller.
    #[must_use]
    pub const fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentAdvance
                | Self::GroupOpenedTooLate
                | Self::AlreadyOpened { .. }
                | Self::InvalidState { .. }
        )
    }

    /// `true` if the error stems from an external cancellation signal.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// `true` for failures caused by data or user callbacks.
    #[must_use]
    pub const fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::StreamProcessingError { .. }
                | Self::ResourceLimitExceeded { .. }
                | Self::UserError(_)
        )
    }
}

/// Specialized Result type for Sluice operations
///
/// # Examples
///
/// ```
/// use sluice_error::Result;
///
/// fn process() -> Result<String> {
///     Ok("processed".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, SluiceError>;

/// Extension trait for converting errors into `SluiceError`
///
/// Automatically implemented for all types that implement
/// `std::error::Error + Send + Sync + 'static`.
pub trait IntoSluiceError {
    /// Convert this error into a `SluiceError` with additional context
    fn into_sluice_error(self, context: &str) -> SluiceError;

    /// Convert this error into a `SluiceError` without additional context
    fn into_sluice(self) -> SluiceError
    where
        Self: Sized,
    {
        self.into_sluice_error("")
    }
}

impl<E: std::error::Error + Send + Sync + 'static> IntoSluiceError for E {
    fn into_sluice_error(self, context: &str) -> SluiceError {
        if context.is_empty() {
            SluiceError::user_error(self)
        } else {
            SluiceError::stream_error(format!("{context}: {self}"))
        }
    }
}

/// Helper trait for adding context to `Result`s
pub trait ResultExt<T> {
    /// Add context to an error
    ///
    /// # Errors
    /// Returns `Err(SluiceError)` if the underlying result is `Err`.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure (lazy evaluation)
    ///
    /// # Errors
    /// Returns `Err(SluiceError)` if the underlying result is `Err`.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<SluiceError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.with_context(|| context.into())
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| match e.into() {
            SluiceError::UserError(inner) => SluiceError::StreamProcessingError {
                context: format!("{}: {inner}", f()),
            },
            other => other,
        })
    }
}

impl Clone for SluiceError {
    fn clone(&self) -> Self {
        match self {
            Self::ConcurrentAdvance => Self::ConcurrentAdvance,
            Self::GroupOpenedTooLate => Self::GroupOpenedTooLate,
            Self::AlreadyOpened { context } => Self::AlreadyOpened {
                context: context.clone(),
            },
            Self::InvalidState { message } => Self::InvalidState {
                message: message.clone(),
            },
            Self::StreamProcessingError { context } => Self::StreamProcessingError {
                context: context.clone(),
            },
            Self::ResourceLimitExceeded { resource, limit } => Self::ResourceLimitExceeded {
                resource: resource.clone(),
                limit: *limit,
            },
            // The boxed source can't be cloned, keep its message
            Self::UserError(e) => Self::StreamProcessingError {
                context: format!("User error: {e}"),
            },
            Self::Cancelled => Self::Cancelled,
        }
    }
}
