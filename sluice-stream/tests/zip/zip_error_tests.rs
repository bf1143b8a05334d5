// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{iter_source, AsyncCursor, AsyncSource, CancellationToken, SluiceError};
use sluice_stream::{zip, zip_with, SourceExt};
use sluice_test_utils::{expect_end, expect_error, expect_next, failing_source, pending_source};
use std::time::Duration;

#[tokio::test]
async fn test_zip_propagates_source_error() -> anyhow::Result<()> {
    // Arrange
    let cursor = zip(vec![
        iter_source(vec![1, 2, 3]).boxed(),
        failing_source(vec![10], SluiceError::stream_error("right failed")).boxed(),
    ])
    .open(CancellationToken::new());

    // Act & Assert
    expect_next(&cursor, vec![1, 10]).await;
    let error = expect_error(&cursor).await;
    assert!(matches!(
        error,
        SluiceError::StreamProcessingError { ref context } if context == "right failed"
    ));
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_zip_selector_error_terminates() -> anyhow::Result<()> {
    // Arrange
    let zipped = zip_with(
        vec![iter_source(vec![1, 2, 3]), iter_source(vec![1, 0, 1])],
        |row: Vec<i32>| {
            if row[1] == 0 {
                Err(SluiceError::stream_error("division by zero"))
            } else {
                Ok(row[0] / row[1])
            }
        },
    );
    let cursor = zipped.open(CancellationToken::new());

    // Act & Assert
    expect_next(&cursor, 1).await;
    assert!(expect_error(&cursor).await.is_data_error());
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_zip_reports_external_cancellation() -> anyhow::Result<()> {
    // Arrange
    let token = CancellationToken::new();
    let cursor = zip(vec![
        pending_source::<i32>(vec![]).boxed(),
        iter_source(vec![1]).boxed(),
    ])
    .open(token.clone());

    // Act
    let (outcome, ()) = tokio::join!(cursor.advance(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    // Assert
    assert!(outcome.unwrap_err().is_cancellation());
    assert!(!cursor.advance().await?);
    Ok(())
}

#[tokio::test]
async fn test_zip_rejects_concurrent_advance() -> anyhow::Result<()> {
    // Arrange
    let cursor = zip(vec![
        pending_source::<i32>(vec![]).boxed(),
        iter_source(vec![1]).boxed(),
    ])
    .open(CancellationToken::new());
    let mut first = cursor.advance();
    assert!(futures::poll!(&mut first).is_pending());

    // Act
    let error = cursor.advance().await.unwrap_err();

    // Assert
    assert!(matches!(error, SluiceError::ConcurrentAdvance));
    drop(first);
    cursor.close().await;
    Ok(())
}
