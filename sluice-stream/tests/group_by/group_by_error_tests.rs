// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{iter_source, AsyncCursor, AsyncSource, CancellationToken, SluiceError};
use sluice_stream::SourceExt;
use sluice_test_utils::{expect_end, expect_error, expect_next, failing_source, pending_source};
use std::time::Duration;

#[tokio::test]
async fn test_group_by_rejects_group_opened_too_late() -> anyhow::Result<()> {
    // Arrange
    let outer = iter_source(vec![("a", 1), ("b", 2)])
        .group_by(|(key, _)| *key)
        .open(CancellationToken::new());
    assert!(outer.advance().await?);
    let skipped = outer.current().expect("first group");

    // Act
    assert!(outer.advance().await?);
    let late = skipped.open(CancellationToken::new());

    // Assert
    let error = expect_error(&late).await;
    assert!(matches!(error, SluiceError::GroupOpenedTooLate));
    assert!(error.is_usage_error());
    Ok(())
}

#[tokio::test]
async fn test_group_by_rejects_second_open() -> anyhow::Result<()> {
    // Arrange
    let outer = iter_source(vec![("a", 1)])
        .group_by(|(key, _)| *key)
        .open(CancellationToken::new());
    assert!(outer.advance().await?);
    let group = outer.current().expect("group surfaced");
    let first = group.open(CancellationToken::new());

    // Act
    let second = group.open(CancellationToken::new());

    // Assert
    assert!(matches!(
        expect_error(&second).await,
        SluiceError::AlreadyOpened { .. }
    ));
    expect_next(&first, ("a", 1)).await;
    Ok(())
}

#[tokio::test]
async fn test_group_by_error_reaches_groups_and_outer() -> anyhow::Result<()> {
    // Arrange
    let outer = failing_source(vec![("a", 1)], SluiceError::stream_error("source failed"))
        .group_by(|(key, _)| *key)
        .open(CancellationToken::new());
    assert!(outer.advance().await?);
    let group = outer
        .current()
        .expect("group surfaced")
        .open(CancellationToken::new());

    // Act
    expect_next(&group, ("a", 1)).await;

    // Assert
    assert!(expect_error(&group).await.is_data_error());
    assert!(expect_error(&outer).await.is_data_error());
    expect_end(&group).await;
    expect_end(&outer).await;
    Ok(())
}

#[tokio::test]
async fn test_try_group_by_key_error_terminates() -> anyhow::Result<()> {
    // Arrange
    let outer = iter_source(vec![1, -1])
        .try_group_by(|n: &i32| {
            if *n < 0 {
                Err(SluiceError::stream_error("negative key"))
            } else {
                Ok(*n % 2)
            }
        })
        .open(CancellationToken::new());
    assert!(outer.advance().await?);
    let group = outer
        .current()
        .expect("group surfaced")
        .open(CancellationToken::new());

    // Act
    expect_next(&group, 1).await;

    // Assert
    assert!(matches!(
        expect_error(&group).await,
        SluiceError::StreamProcessingError { ref context } if context == "negative key"
    ));
    assert!(expect_error(&outer).await.is_data_error());
    Ok(())
}

#[tokio::test]
async fn test_group_cursor_reports_its_own_cancellation() -> anyhow::Result<()> {
    // Arrange
    let outer = pending_source(vec![("a", 1)])
        .group_by(|(key, _)| *key)
        .open(CancellationToken::new());
    assert!(outer.advance().await?);
    let token = CancellationToken::new();
    let group = outer.current().expect("group surfaced").open(token.clone());
    expect_next(&group, ("a", 1)).await;

    // Act
    let (outcome, ()) = tokio::join!(group.advance(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    // Assert
    assert!(outcome.unwrap_err().is_cancellation());
    expect_end(&group).await;
    outer.close().await;
    Ok(())
}
