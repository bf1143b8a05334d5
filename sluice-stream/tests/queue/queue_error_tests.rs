// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{AsyncCursor, AsyncSource, CancellationToken, SluiceError};
use sluice_stream::queue::{channel, Backpressure, ThrowOnFull};
use sluice_stream::SourceExt;
use sluice_test_utils::{expect_end, expect_error, expect_next, failing_source, pending_source};
use std::time::Duration;

#[tokio::test]
async fn test_throw_on_full_reports_overflow_after_buffered_items() -> anyhow::Result<()> {
    // Arrange
    let (mut sender, cursor) = channel(ThrowOnFull::new(2));
    sender.enqueue(1).await?;
    sender.enqueue(2).await?;

    // Act
    let overflow = sender.enqueue(3).await;

    // Assert
    assert!(matches!(
        overflow,
        Err(SluiceError::ResourceLimitExceeded { limit: 2, .. })
    ));
    assert!(matches!(
        sender.enqueue(4).await,
        Err(SluiceError::InvalidState { .. })
    ));
    expect_next(&cursor, 1).await;
    expect_next(&cursor, 2).await;
    assert!(matches!(
        expect_error(&cursor).await,
        SluiceError::ResourceLimitExceeded { limit: 2, .. }
    ));
    expect_end(&cursor).await;
    Ok(())
}

#[test]
fn test_zero_capacity_is_rejected() {
    assert!(matches!(
        ThrowOnFull::<i32>::try_new(0),
        Err(SluiceError::InvalidState { .. })
    ));
    assert!(Backpressure::<i32>::try_new(0).is_err());
}

#[tokio::test]
async fn test_sender_failure_follows_buffered_items() -> anyhow::Result<()> {
    // Arrange
    let (mut sender, cursor) = channel(Backpressure::new(4));
    sender.enqueue("a").await?;

    // Act
    sender.fail(SluiceError::stream_error("producer failed"));

    // Assert
    expect_next(&cursor, "a").await;
    assert!(matches!(
        expect_error(&cursor).await,
        SluiceError::StreamProcessingError { ref context } if context == "producer failed"
    ));
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_buffer_propagates_upstream_error() -> anyhow::Result<()> {
    // Arrange
    let cursor = failing_source(vec![1, 2], SluiceError::stream_error("upstream"))
        .buffer(Backpressure::new(4))
        .open(CancellationToken::new());

    // Act & Assert
    expect_next(&cursor, 1).await;
    expect_next(&cursor, 2).await;
    assert!(expect_error(&cursor).await.is_data_error());
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_buffer_reports_external_cancellation() -> anyhow::Result<()> {
    // Arrange
    let token = CancellationToken::new();
    let cursor = pending_source(vec![1])
        .buffer(Backpressure::new(4))
        .open(token.clone());
    expect_next(&cursor, 1).await;

    // Act
    let (outcome, ()) = tokio::join!(cursor.advance(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    // Assert
    assert!(outcome.unwrap_err().is_cancellation());
    expect_end(&cursor).await;
    Ok(())
}
