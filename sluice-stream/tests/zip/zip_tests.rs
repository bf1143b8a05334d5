// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{iter_source, AsyncCursor, AsyncSource, CancellationToken, IterSource};
use sluice_stream::{zip, zip_with, SourceExt};
use sluice_test_utils::{
    assert_no_item_within, collect_values, delayed_source, expect_end, expect_next,
    pending_source, CountingSource,
};
use std::time::Duration;

#[tokio::test]
async fn test_zip_stops_at_shortest_source() -> anyhow::Result<()> {
    // Arrange
    let zipped = zip(vec![
        iter_source(vec![1, 2, 3]),
        iter_source(vec![10, 20, 30, 40, 50]),
        iter_source(vec![100, 200, 300, 400]),
    ]);

    // Act
    let rows = collect_values(&zipped.open(CancellationToken::new())).await?;

    // Assert
    assert_eq!(
        rows,
        vec![vec![1, 10, 100], vec![2, 20, 200], vec![3, 30, 300]]
    );
    Ok(())
}

#[tokio::test]
async fn test_zip_with_applies_selector_to_every_row() -> anyhow::Result<()> {
    // Arrange
    let zipped = zip_with(
        vec![iter_source(vec![1, 2]), iter_source(vec![10, 20])],
        |row: Vec<i32>| Ok(row.iter().sum::<i32>()),
    );

    // Act
    let sums = collect_values(&zipped.open(CancellationToken::new())).await?;

    // Assert
    assert_eq!(sums, vec![11, 22]);
    Ok(())
}

#[tokio::test]
async fn test_zip_without_sources_is_empty() -> anyhow::Result<()> {
    let zipped = zip(Vec::<IterSource<i32>>::new());
    let cursor = zipped.open(CancellationToken::new());

    assert!(!cursor.advance().await?);
    Ok(())
}

#[tokio::test]
async fn test_zip_pairs_by_position_not_by_time() -> anyhow::Result<()> {
    // Arrange
    let fast = iter_source(vec!["a", "b"]).boxed();
    let slow = delayed_source(vec![("x", 30), ("y", 30)]).boxed();
    let cursor = fast.zip(slow).open(CancellationToken::new());

    // Act & Assert
    expect_next(&cursor, vec!["a", "x"]).await;
    expect_next(&cursor, vec!["b", "y"]).await;
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_zip_opens_each_source_once_and_closes_it() -> anyhow::Result<()> {
    // Arrange
    let (left, left_stats) = CountingSource::new(iter_source(vec![1, 2, 3]));
    let (right, right_stats) = CountingSource::new(iter_source(vec![4, 5, 6]));
    let cursor = zip(vec![left.boxed(), right.boxed()]).open(CancellationToken::new());

    // Act
    expect_next(&cursor, vec![1, 4]).await;
    cursor.close().await;

    // Assert
    assert_eq!(left_stats.opened(), 1);
    assert_eq!(right_stats.opened(), 1);
    assert_eq!(left_stats.closed(), 1);
    assert_eq!(right_stats.closed(), 1);
    Ok(())
}

#[tokio::test]
async fn test_zip_close_before_first_advance_closes_sources() -> anyhow::Result<()> {
    // Arrange
    let (source, stats) = CountingSource::new(iter_source(vec![1]));
    let cursor = zip(vec![source]).open(CancellationToken::new());

    // Act
    cursor.close().await;

    // Assert
    assert_eq!(stats.closed(), 1);
    assert_eq!(stats.advanced(), 0);
    assert!(!cursor.advance().await?);
    Ok(())
}

#[tokio::test]
async fn test_zip_abandoned_advance_is_resumed() -> anyhow::Result<()> {
    // Arrange
    let cursor = zip(vec![
        delayed_source(vec![(1, 80)]).boxed(),
        iter_source(vec![2]).boxed(),
    ])
    .open(CancellationToken::new());

    // Act
    assert_no_item_within(&cursor, 10).await;

    // Assert
    expect_next(&cursor, vec![1, 2]).await;
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_zip_close_releases_pending_advance() -> anyhow::Result<()> {
    // Arrange
    let cursor = zip(vec![
        pending_source::<i32>(vec![]).boxed(),
        iter_source(vec![1]).boxed(),
    ])
    .open(CancellationToken::new());

    // Act
    let (outcome, ()) = tokio::join!(cursor.advance(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cursor.close().await;
    });

    // Assert
    assert!(!outcome?);
    Ok(())
}

#[tokio::test]
async fn test_zip_double_close_is_harmless() -> anyhow::Result<()> {
    let cursor = zip(vec![iter_source(vec![1, 2]), iter_source(vec![3, 4])])
        .open(CancellationToken::new());
    expect_next(&cursor, vec![1, 3]).await;

    tokio::join!(cursor.close(), cursor.close());
    cursor.close().await;

    assert!(!cursor.advance().await?);
    Ok(())
}
