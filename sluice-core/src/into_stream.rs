// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::cursor::AsyncCursor;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use sluice_error::Result;

/// Converts a cursor into a `futures::Stream`.
///
/// The stream yields every item, then ends; an error is yielded once and ends the stream.
/// The cursor is closed when the stream ends.
pub trait IntoStream {
    /// The type of items in the stream.
    type Item;

    /// Consume the cursor as a stream of `Result`s.
    fn into_stream(self) -> BoxStream<'static, Result<Self::Item>>;
}

impl<C> IntoStream for C
where
    C: AsyncCursor + 'static,
{
    type Item = C::Item;

    fn into_stream(self) -> BoxStream<'static, Result<Self::Item>> {
        stream::unfold(Some(self), |cursor| async move {
            let cursor = cursor?;
            match cursor.advance().await {
                Ok(true) => match cursor.current() {
                    Some(item) => Some((Ok(item), Some(cursor))),
                    None => {
                        cursor.close().await;
                        None
                    }
                },
                Ok(false) => {
                    cursor.close().await;
                    None
                }
                Err(error) => {
                    cursor.close().await;
                    Some((Err(error), None))
                }
            }
        })
        .boxed()
    }
}
