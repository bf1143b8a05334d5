// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use core::fmt::Debug;
use sluice_core::AsyncCursor;
use sluice_error::{Result, SluiceError};
use std::time::Duration;
use tokio::time::timeout;

/// Upper bound for any single `advance()` awaited by these helpers.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

async fn step<C>(cursor: &C) -> Result<bool>
where
    C: AsyncCursor + ?Sized,
{
    match timeout(STEP_TIMEOUT, cursor.advance()).await {
        Ok(outcome) => outcome,
        Err(_) => panic!("Timeout: advance() did not resolve within {STEP_TIMEOUT:?}"),
    }
}

/// Drain `cursor` to exhaustion.
///
/// # Errors
///
/// Returns the first error the cursor reports.
pub async fn collect_values<C>(cursor: &C) -> Result<Vec<C::Item>>
where
    C: AsyncCursor + ?Sized,
{
    let mut values = Vec::new();
    while step(cursor).await? {
        values.extend(cursor.current());
    }
    Ok(values)
}

/// Assert the next item equals `expected`.
pub async fn expect_next<C>(cursor: &C, expected: C::Item)
where
    C: AsyncCursor + ?Sized,
    C::Item: PartialEq + Debug,
{
    match step(cursor).await {
        Ok(true) => assert_eq!(cursor.current(), Some(expected)),
        Ok(false) => panic!("Expected {expected:?} but the cursor ended"),
        Err(error) => panic!("Expected {expected:?} but got error: {error}"),
    }
}

/// Assert the cursor is exhausted.
pub async fn expect_end<C>(cursor: &C)
where
    C: AsyncCursor + ?Sized,
    C::Item: Debug,
{
    match step(cursor).await {
        Ok(false) => {}
        Ok(true) => panic!("Expected end but got {:?}", cursor.current()),
        Err(error) => panic!("Expected end but got error: {error}"),
    }
}

/// Assert the next `advance()` fails, returning the error.
pub async fn expect_error<C>(cursor: &C) -> SluiceError
where
    C: AsyncCursor + ?Sized,
    C::Item: Debug,
{
    match step(cursor).await {
        Err(error) => error,
        Ok(true) => panic!("Expected error but got {:?}", cursor.current()),
        Ok(false) => panic!("Expected error but the cursor ended"),
    }
}

/// Assert no `advance()` resolves within `timeout_ms`.
///
/// The abandoned `advance()` is resumed by the cursor's next one.
pub async fn assert_no_item_within<C>(cursor: &C, timeout_ms: u64)
where
    C: AsyncCursor + ?Sized,
    C::Item: Debug,
{
    if let Ok(outcome) = timeout(Duration::from_millis(timeout_ms), cursor.advance()).await {
        match outcome {
            Ok(true) => panic!("Unexpected item emitted: {:?}", cursor.current()),
            Ok(false) => panic!("Unexpected end, expected no output"),
            Err(error) => panic!("Unexpected error, expected no output: {error}"),
        }
    }
}
