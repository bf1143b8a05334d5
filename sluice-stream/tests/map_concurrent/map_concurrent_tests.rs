// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use core::sync::atomic::{AtomicUsize, Ordering};
use sluice_core::{iter_source, AsyncCursor, AsyncSource, CancellationToken};
use sluice_stream::{MapOrdering, SourceExt};
use sluice_test_utils::{collect_values, pending_source, CountingSource};
use std::sync::Arc;
use std::time::Duration;

async fn sleep_then<T>(value: T, ms: u64) -> sluice_core::Result<T> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(value)
}

#[tokio::test]
async fn test_map_concurrent_preserves_upstream_order() -> anyhow::Result<()> {
    // Arrange
    let mapped = iter_source(vec![("a", 60), ("b", 10), ("c", 10)])
        .map_concurrent(2, MapOrdering::Preserve, |(name, ms)| sleep_then(name, ms));

    // Act
    let names = collect_values(&mapped.open(CancellationToken::new())).await?;

    // Assert
    assert_eq!(names, vec!["a", "b", "c"]);
    Ok(())
}

#[tokio::test]
async fn test_map_concurrent_completion_order() -> anyhow::Result<()> {
    // Arrange
    let mapped = iter_source(vec![("a", 100), ("b", 10), ("c", 40)])
        .map_concurrent(3, MapOrdering::Completion, |(name, ms)| sleep_then(name, ms));

    // Act
    let names = collect_values(&mapped.open(CancellationToken::new())).await?;

    // Assert
    assert_eq!(names, vec!["b", "c", "a"]);
    Ok(())
}

#[tokio::test]
async fn test_map_concurrent_never_exceeds_limit() -> anyhow::Result<()> {
    // Arrange
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mapped = {
        let running = running.clone();
        let peak = peak.clone();
        iter_source((1..=12).collect::<Vec<u64>>()).map_concurrent(
            3,
            MapOrdering::Preserve,
            move |n| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5 + n % 3 * 5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(n)
                }
            },
        )
    };

    // Act
    let values = collect_values(&mapped.open(CancellationToken::new())).await?;

    // Assert
    assert_eq!(values, (1..=12).collect::<Vec<u64>>());
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 2);
    Ok(())
}

#[tokio::test]
async fn test_map_concurrent_with_limit_one_is_sequential() -> anyhow::Result<()> {
    // Arrange
    let mapped = iter_source(vec![("slow", 40), ("fast", 0)])
        .map_concurrent(1, MapOrdering::Completion, |(name, ms)| sleep_then(name, ms));

    // Act
    let names = collect_values(&mapped.open(CancellationToken::new())).await?;

    // Assert
    assert_eq!(names, vec!["slow", "fast"]);
    Ok(())
}

#[tokio::test]
async fn test_map_concurrent_close_releases_pending_advance() -> anyhow::Result<()> {
    // Arrange
    let (source, stats) = CountingSource::new(pending_source(vec![1]));
    let cursor = source
        .map_concurrent(2, MapOrdering::Preserve, |_| {
            futures::future::pending::<sluice_core::Result<i32>>()
        })
        .open(CancellationToken::new());

    // Act
    let (outcome, ()) = tokio::join!(cursor.advance(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cursor.close().await;
    });

    // Assert
    assert!(!outcome?);
    assert!(!cursor.advance().await?);
    assert_eq!(stats.closed(), 1);
    Ok(())
}
