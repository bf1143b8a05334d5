// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{iter_source, AsyncCursor, AsyncSource, CancellationToken, SluiceError};
use sluice_stream::queue::{
    channel, Backpressure, LeastRecent, LeastRecentBatch, MostRecent, MostRecentBatch,
};
use sluice_stream::SourceExt;
use sluice_test_utils::{collect_values, expect_end, expect_next, CountingSource};
use std::time::Duration;

#[tokio::test]
async fn test_backpressure_parks_producer_until_consumer_dequeues() -> anyhow::Result<()> {
    // Arrange
    let (mut sender, cursor) = channel(Backpressure::new(2));
    sender.enqueue(1).await?;
    sender.enqueue(2).await?;

    // Act
    let mut third = Box::pin(sender.enqueue(3));
    assert!(futures::poll!(&mut third).is_pending());
    expect_next(&cursor, 1).await;
    third.await?;

    // Assert
    sender.complete();
    expect_next(&cursor, 2).await;
    expect_next(&cursor, 3).await;
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_most_recent_keeps_newest_and_counts_drops() -> anyhow::Result<()> {
    // Arrange
    let (mut sender, cursor) = channel(MostRecent::new(1));

    // Act
    for n in 1..=3 {
        sender.enqueue(n).await?;
    }
    sender.complete();

    // Assert
    assert_eq!(cursor.len(), 1);
    assert_eq!(cursor.dropped(), 2);
    expect_next(&cursor, 3).await;
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_least_recent_discards_new_arrivals() -> anyhow::Result<()> {
    // Arrange
    let (mut sender, cursor) = channel(LeastRecent::new(2));

    // Act
    for n in 1..=4 {
        sender.enqueue(n).await?;
    }
    sender.complete();

    // Assert
    assert_eq!(collect_values(&cursor).await?, vec![1, 2]);
    assert_eq!(cursor.dropped(), 2);
    Ok(())
}

#[tokio::test]
async fn test_batch_policies_deliver_the_whole_buffer() -> anyhow::Result<()> {
    // Arrange
    let (mut newest, newest_cursor) = channel(MostRecentBatch::new(3));
    let (mut oldest, oldest_cursor) = channel(LeastRecentBatch::new(2));

    // Act
    for n in 1..=5 {
        newest.enqueue(n).await?;
        oldest.enqueue(n).await?;
    }

    // Assert
    expect_next(&newest_cursor, vec![3, 4, 5]).await;
    expect_next(&oldest_cursor, vec![1, 2]).await;
    assert_eq!(oldest_cursor.dropped(), 3);

    oldest.enqueue(6).await?;
    drop(oldest);
    expect_next(&oldest_cursor, vec![6]).await;
    expect_end(&oldest_cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_consumer_waits_for_next_item() -> anyhow::Result<()> {
    // Arrange
    let (mut sender, cursor) = channel(Backpressure::new(4));

    // Act
    let (first, ()) = tokio::join!(cursor.advance(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        sender.enqueue("late").await.expect("queue open");
    });

    // Assert
    assert!(first?);
    assert_eq!(cursor.current(), Some("late"));
    Ok(())
}

#[tokio::test]
async fn test_dropping_sender_completes_queue() -> anyhow::Result<()> {
    // Arrange
    let (mut sender, cursor) = channel(Backpressure::new(4));
    sender.enqueue(1).await?;

    // Act
    drop(sender);

    // Assert
    expect_next(&cursor, 1).await;
    expect_end(&cursor).await;
    Ok(())
}

#[tokio::test]
async fn test_consumer_close_rejects_further_items() -> anyhow::Result<()> {
    // Arrange
    let (mut sender, cursor) = channel(Backpressure::new(4));
    sender.enqueue(1).await?;

    // Act
    cursor.close().await;

    // Assert
    assert!(sender.is_closed());
    assert!(cursor.is_empty());
    assert!(matches!(
        sender.enqueue(2).await,
        Err(SluiceError::InvalidState { .. })
    ));
    assert!(!cursor.advance().await?);
    Ok(())
}

#[tokio::test]
async fn test_consumer_close_releases_parked_producer() -> anyhow::Result<()> {
    // Arrange
    let (mut sender, cursor) = channel(Backpressure::new(1));
    let producer = tokio::spawn(async move {
        sender.enqueue(1).await?;
        sender.enqueue(2).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Act
    cursor.close().await;

    // Assert
    let outcome = producer.await?;
    assert!(matches!(outcome, Err(SluiceError::InvalidState { .. })));
    Ok(())
}

#[tokio::test]
async fn test_consumer_close_releases_pending_advance() -> anyhow::Result<()> {
    // Arrange
    let (sender, cursor) = channel(Backpressure::<i32>::new(2));

    // Act
    let (outcome, ()) = tokio::join!(cursor.advance(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::join!(cursor.close(), cursor.close());
    });

    // Assert
    assert!(!outcome?);
    assert!(sender.is_closed());
    assert!(!cursor.advance().await?);
    Ok(())
}

#[tokio::test]
async fn test_buffer_delivers_everything_under_backpressure() -> anyhow::Result<()> {
    // Arrange
    let buffered = iter_source((1..=5).collect::<Vec<_>>()).buffer(Backpressure::new(2));

    // Act
    let values = collect_values(&buffered.open(CancellationToken::new())).await?;

    // Assert
    assert_eq!(values, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[tokio::test]
async fn test_buffer_reopens_with_fresh_policy() -> anyhow::Result<()> {
    // Arrange
    let buffered = iter_source(vec![1, 2, 3]).buffer(MostRecentBatch::new(8));

    // Act
    let first = collect_values(&buffered.open(CancellationToken::new())).await?;
    let second = collect_values(&buffered.open(CancellationToken::new())).await?;

    // Assert
    assert_eq!(first.concat(), vec![1, 2, 3]);
    assert_eq!(second.concat(), vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_buffer_close_before_advance_closes_upstream() -> anyhow::Result<()> {
    // Arrange
    let (source, stats) = CountingSource::new(iter_source(vec![1, 2]));
    let cursor = source.buffer(Backpressure::new(2)).open(CancellationToken::new());

    // Act
    cursor.close().await;

    // Assert
    assert_eq!(stats.closed(), 1);
    assert_eq!(stats.advanced(), 0);
    assert!(!cursor.advance().await?);
    Ok(())
}
