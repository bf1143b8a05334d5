// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{empty_source, iter_source, AsyncCursor, AsyncSource, CancellationToken};
use sluice_stream::{combine_latest, combine_latest_with, SourceExt};
use sluice_test_utils::{
    assert_no_item_within, collect_values, expect_end, expect_next, pending_source,
    scripted_source, Step,
};
use std::time::Duration;

#[tokio::test]
async fn test_combine_latest_emits_once_all_sources_produced() -> anyhow::Result<()> {
    // Arrange
    let combined = combine_latest(vec![iter_source(vec![1, 2]), iter_source(vec![10])]);

    // Act
    let rows = collect_values(&combined.open(CancellationToken::new())).await?;

    // Assert
    assert_eq!(rows, vec![vec![1, 10], vec![2, 10]]);
    Ok(())
}

#[tokio::test]
async fn test_combine_latest_waits_for_every_source() -> anyhow::Result<()> {
    // Arrange
    let cursor = iter_source(vec![1])
        .boxed()
        .combine_latest(pending_source::<i32>(vec![]))
        .open(CancellationToken::new());

    // Act & Assert
    assert_no_item_within(&cursor, 50).await;
    cursor.close().await;
    Ok(())
}

#[tokio::test]
async fn test_combine_latest_each_update_yields_a_combination() -> anyhow::Result<()> {
    // Arrange
    let combined = combine_latest_with(
        vec![iter_source(vec![1, 2, 3]), iter_source(vec![100])],
        |row: Vec<i32>| Ok(row[0] + row[1]),
    );

    // Act
    let sums = collect_values(&combined.open(CancellationToken::new())).await?;

    // Assert
    assert_eq!(sums, vec![101, 102, 103]);
    Ok(())
}

#[tokio::test]
async fn test_combine_latest_keeps_only_newest_unconsumed_combination() -> anyhow::Result<()> {
    // Arrange
    let left = iter_source(vec![1, 2]);
    let right = scripted_source(vec![Step::Value(10), Step::delay_ms(30), Step::Value(20)]);
    let cursor = left.combine_latest(right).open(CancellationToken::new());

    // Act
    expect_next(&cursor, vec![1, 10]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Assert: [2, 10] was overwritten by [2, 20] before anyone pulled it
    expect_next(&cursor, vec![2, 20]).await;
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_combine_latest_completes_when_a_source_never_produces() -> anyhow::Result<()> {
    // Arrange
    let cursor = combine_latest(vec![
        iter_source(vec![1, 2]).boxed(),
        empty_source::<i32>().boxed(),
    ])
    .open(CancellationToken::new());

    // Act & Assert
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_combine_latest_close_releases_pending_advance() -> anyhow::Result<()> {
    // Arrange
    let cursor = combine_latest(vec![
        iter_source(vec![1]).boxed(),
        pending_source::<i32>(vec![]).boxed(),
    ])
    .open(CancellationToken::new());

    // Act
    let (outcome, ()) = tokio::join!(cursor.advance(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cursor.close().await;
        cursor.close().await;
    });

    // Assert
    assert!(!outcome?);
    assert!(!cursor.advance().await?);
    Ok(())
}
