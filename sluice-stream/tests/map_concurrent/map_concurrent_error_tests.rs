// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{iter_source, AsyncCursor, AsyncSource, CancellationToken, SluiceError};
use sluice_stream::{MapOrdering, SourceExt};
use sluice_test_utils::{expect_end, expect_error, expect_next, failing_source};
use std::time::Duration;

#[tokio::test]
async fn test_map_concurrent_rejects_zero_limit() -> anyhow::Result<()> {
    // Arrange
    let cursor = iter_source(vec![1])
        .map_concurrent(0, MapOrdering::Preserve, |n| async move { Ok(n) })
        .open(CancellationToken::new());

    // Act
    let error = expect_error(&cursor).await;

    // Assert
    assert!(matches!(error, SluiceError::InvalidState { .. }));
    Ok(())
}

#[tokio::test]
async fn test_map_concurrent_error_follows_earlier_results() -> anyhow::Result<()> {
    // Arrange
    let cursor = iter_source(vec![1, 2, 3, 4])
        .map_concurrent(1, MapOrdering::Preserve, |n| async move {
            if n == 3 {
                Err(SluiceError::stream_error("three"))
            } else {
                Ok(n * 10)
            }
        })
        .open(CancellationToken::new());

    // Act & Assert
    expect_next(&cursor, 10).await;
    expect_next(&cursor, 20).await;
    assert!(matches!(
        expect_error(&cursor).await,
        SluiceError::StreamProcessingError { ref context } if context == "three"
    ));
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_map_concurrent_reports_only_first_error() -> anyhow::Result<()> {
    // Arrange
    let cursor = iter_source(vec![(1, 10), (2, 30), (3, 60)])
        .map_concurrent(3, MapOrdering::Completion, |(n, ms)| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            if n == 1 {
                Ok(n)
            } else {
                Err(SluiceError::stream_error(format!("failed {n}")))
            }
        })
        .open(CancellationToken::new());

    // Act & Assert
    expect_next(&cursor, 1).await;
    assert!(matches!(
        expect_error(&cursor).await,
        SluiceError::StreamProcessingError { ref context } if context == "failed 2"
    ));
    tokio::time::sleep(Duration::from_millis(80)).await;
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_map_concurrent_upstream_error_after_results() -> anyhow::Result<()> {
    // Arrange
    let cursor = failing_source(vec![1, 2], SluiceError::stream_error("upstream"))
        .map_concurrent(2, MapOrdering::Preserve, |n| async move { Ok(n + 100) })
        .open(CancellationToken::new());

    // Act & Assert
    expect_next(&cursor, 101).await;
    expect_next(&cursor, 102).await;
    assert!(expect_error(&cursor).await.is_data_error());
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_map_concurrent_reports_external_cancellation() -> anyhow::Result<()> {
    // Arrange
    let token = CancellationToken::new();
    let cursor = iter_source(vec![1])
        .map_concurrent(1, MapOrdering::Preserve, |n| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(n)
        })
        .open(token.clone());

    // Act
    let (outcome, ()) = tokio::join!(cursor.advance(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    // Assert
    assert!(outcome.unwrap_err().is_cancellation());
    Ok(())
}
