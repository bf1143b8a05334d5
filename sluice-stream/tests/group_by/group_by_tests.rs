// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{
    iter_source, AsyncCursor, AsyncSource, BoxCursor, CancellationToken, SluiceError,
};
use sluice_stream::{Group, GroupRetention, SourceExt};
use sluice_test_utils::{
    collect_values, expect_end, expect_error, expect_next, pending_source, scripted_source,
    CountingSource, Step,
};
use std::time::Duration;

type Pair = (char, i32);

async fn next_group(outer: &BoxCursor<Group<char, Pair>>) -> Group<char, Pair> {
    assert!(outer.advance().await.expect("outer advance failed"));
    outer.current().expect("outer advanced without a group")
}

#[tokio::test]
async fn test_group_by_routes_items_to_their_group() -> anyhow::Result<()> {
    // Arrange
    let source = iter_source(vec![('a', 1), ('a', 2), ('b', 3), ('a', 4)]);
    let outer = source.group_by(|(key, _)| *key).open(CancellationToken::new());

    // Act
    let first = next_group(&outer).await;
    let first_cursor = first.open(CancellationToken::new());
    let first_values = tokio::spawn(async move { collect_values(&first_cursor).await });

    let second = next_group(&outer).await;
    let second_cursor = second.open(CancellationToken::new());
    let second_values = tokio::spawn(async move { collect_values(&second_cursor).await });

    // Assert
    assert_eq!(*first.key(), 'a');
    assert_eq!(*second.key(), 'b');
    expect_end(&outer).await;
    assert_eq!(first_values.await??, vec![('a', 1), ('a', 2), ('a', 4)]);
    assert_eq!(second_values.await??, vec![('b', 3)]);
    Ok(())
}

#[tokio::test]
async fn test_group_by_outer_close_keeps_opened_group_alive() -> anyhow::Result<()> {
    // Arrange
    let source = iter_source(vec![('a', 1), ('b', 2), ('a', 3)]);
    let outer = source.group_by(|(key, _)| *key).open(CancellationToken::new());
    let group = next_group(&outer).await.open(CancellationToken::new());

    // Act
    outer.close().await;

    // Assert: 'b' arrives after the outer side closed and is dropped
    assert_eq!(collect_values(&group).await?, vec![('a', 1), ('a', 3)]);
    assert!(!outer.advance().await?);
    Ok(())
}

#[tokio::test]
async fn test_group_by_outer_close_without_groups_closes_upstream() -> anyhow::Result<()> {
    // Arrange
    let (source, stats) = CountingSource::new(iter_source(vec![('a', 1), ('a', 2)]));
    let outer = source.group_by(|(key, _)| *key).open(CancellationToken::new());
    let _unopened = next_group(&outer).await;

    // Act
    outer.close().await;

    // Assert
    assert_eq!(stats.opened(), 1);
    assert_eq!(stats.closed(), 1);
    assert!(!outer.advance().await?);
    Ok(())
}

#[tokio::test]
async fn test_group_by_last_group_close_closes_upstream() -> anyhow::Result<()> {
    // Arrange
    let (source, stats) =
        CountingSource::new(scripted_source(vec![Step::Value(('a', 1)), Step::Pending]));
    let outer = source.group_by(|(key, _)| *key).open(CancellationToken::new());
    let group = next_group(&outer).await.open(CancellationToken::new());
    expect_next(&group, ('a', 1)).await;
    outer.close().await;
    assert_eq!(stats.closed(), 0);

    // Act
    group.close().await;

    // Assert
    assert_eq!(stats.closed(), 1);
    Ok(())
}

#[tokio::test]
async fn test_group_by_default_retention_discards_items_of_closed_group() -> anyhow::Result<()> {
    // Arrange
    let source = scripted_source(vec![
        Step::Value(('k', 1)),
        Step::delay_ms(50),
        Step::Value(('k', 2)),
    ]);
    let outer = source.group_by(|(key, _)| *key).open(CancellationToken::new());
    let group = next_group(&outer).await.open(CancellationToken::new());
    expect_next(&group, ('k', 1)).await;

    // Act
    group.close().await;

    // Assert
    assert!(!outer.advance().await?);
    Ok(())
}

#[tokio::test]
async fn test_group_by_remove_on_close_surfaces_new_group_for_reused_key() -> anyhow::Result<()> {
    // Arrange
    let source = scripted_source(vec![
        Step::Value(('k', 1)),
        Step::delay_ms(50),
        Step::Value(('k', 2)),
    ]);
    let outer = source
        .group_by(|(key, _)| *key)
        .with_retention(GroupRetention::RemoveOnClose)
        .open(CancellationToken::new());
    let first = next_group(&outer).await.open(CancellationToken::new());
    expect_next(&first, ('k', 1)).await;

    // Act
    first.close().await;
    let second = next_group(&outer).await;

    // Assert
    assert_eq!(*second.key(), 'k');
    let second = second.open(CancellationToken::new());
    expect_next(&second, ('k', 2)).await;
    expect_end(&second).await;
    expect_end(&outer).await;
    Ok(())
}

#[tokio::test]
async fn test_try_group_by_with_infallible_keys() -> anyhow::Result<()> {
    // Arrange
    let outer = iter_source(vec![('x', 1)])
        .try_group_by(|(key, _)| Ok(key.to_ascii_uppercase()))
        .open(CancellationToken::new());

    // Act
    assert!(outer.advance().await?);
    let group = outer.current().expect("group surfaced");

    // Assert
    assert_eq!(*group.key(), 'X');
    let cursor = group.open(CancellationToken::new());
    expect_next(&cursor, ('x', 1)).await;
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_group_by_skipped_group_discards_later_items_of_its_key() -> anyhow::Result<()> {
    // Arrange
    let source = iter_source(vec![('a', 1), ('a', 2), ('b', 3), ('a', 4)]);
    let outer = source.group_by(|(key, _)| *key).open(CancellationToken::new());
    let skipped = next_group(&outer).await;

    // Act
    let second = next_group(&outer).await;
    let second_cursor = second.open(CancellationToken::new());

    // Assert
    assert_eq!(*second.key(), 'b');
    assert_eq!(collect_values(&second_cursor).await?, vec![('b', 3)]);
    expect_end(&outer).await;
    let late = skipped.open(CancellationToken::new());
    assert!(matches!(
        expect_error(&late).await,
        SluiceError::GroupOpenedTooLate
    ));
    Ok(())
}

#[tokio::test]
async fn test_group_by_dropped_outer_lets_open_groups_finish() -> anyhow::Result<()> {
    // Arrange
    let source = iter_source(vec![('a', 1), ('b', 2), ('a', 3)]);
    let outer = source.group_by(|(key, _)| *key).open(CancellationToken::new());
    let first = next_group(&outer).await.open(CancellationToken::new());
    let drained = tokio::spawn(async move { collect_values(&first).await });
    let _unopened = next_group(&outer).await;

    // Act
    drop(outer);

    // Assert
    assert_eq!(drained.await??, vec![('a', 1), ('a', 3)]);
    Ok(())
}

#[tokio::test]
async fn test_group_by_outer_close_releases_pending_advance() -> anyhow::Result<()> {
    // Arrange
    let outer = pending_source(Vec::<Pair>::new())
        .group_by(|(key, _)| *key)
        .open(CancellationToken::new());

    // Act
    let (outcome, ()) = tokio::join!(outer.advance(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::join!(outer.close(), outer.close());
    });

    // Assert
    assert!(!outcome?);
    assert!(!outer.advance().await?);
    Ok(())
}

#[tokio::test]
async fn test_group_close_releases_pending_advance() -> anyhow::Result<()> {
    // Arrange
    let outer = pending_source(vec![('a', 1)])
        .group_by(|(key, _)| *key)
        .open(CancellationToken::new());
    let group = next_group(&outer).await.open(CancellationToken::new());
    expect_next(&group, ('a', 1)).await;

    // Act
    let (outcome, ()) = tokio::join!(group.advance(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::join!(group.close(), group.close());
    });

    // Assert
    assert!(!outcome?);
    expect_end(&group).await;
    outer.close().await;
    Ok(())
}
