//! Top-level consumers that drain a reader: collect, for_each and reduce.
//!
//! Each accepts a cancellation future (any `Future<Output = ()>`; a
//! `tokio::time::sleep` works as a deadline). When it resolves first the reader
//! is closed and [`StreamError::Cancelled`] is returned. `SourceEof` signals
//! are skipped so a merged reader is drained completely; every other error
//! stops the helper and is returned.

use futures::future;
use std::future::Future;

use crate::error::{StreamError, StreamResult};
use crate::reader::StreamReader;

async fn next_or_cancel<T, R, C>(reader: &R, cancel: &mut std::pin::Pin<&mut C>) -> StreamResult<Option<T>>
where
    T: Send + 'static,
    R: StreamReader<T> + ?Sized,
    C: Future<Output = ()>,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.as_mut() => {
                reader.close();
                return Err(StreamError::Cancelled);
            }
            next = reader.recv() => next,
        };
        match next {
            Err(err) if err.is_source_eof() => {
                log::trace!("skipping {}", err);
            }
            other => return other,
        }
    }
}

/// Gather every element into a vector.
pub async fn collect<T, R, C>(reader: &R, cancel: C) -> StreamResult<Vec<T>>
where
    T: Send + 'static,
    R: StreamReader<T> + ?Sized,
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);
    let mut items = Vec::new();
    while let Some(item) = next_or_cancel(reader, &mut cancel).await? {
        items.push(item);
    }
    Ok(items)
}

/// [`collect`] without a cancellation signal.
pub async fn collect_all<T, R>(reader: &R) -> StreamResult<Vec<T>>
where
    T: Send + 'static,
    R: StreamReader<T> + ?Sized,
{
    collect(reader, future::pending::<()>()).await
}

/// Run `f` on every element, in order, awaiting each call before the next `recv`.
pub async fn for_each<T, R, C, F, Fut>(reader: &R, mut f: F, cancel: C) -> StreamResult<()>
where
    T: Send + 'static,
    R: StreamReader<T> + ?Sized,
    C: Future<Output = ()>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::pin!(cancel);
    while let Some(item) = next_or_cancel(reader, &mut cancel).await? {
        f(item).await;
    }
    Ok(())
}

/// Fold every element into an accumulator.
pub async fn reduce<T, A, R, C, F, Fut>(reader: &R, init: A, mut f: F, cancel: C) -> StreamResult<A>
where
    T: Send + 'static,
    R: StreamReader<T> + ?Sized,
    C: Future<Output = ()>,
    F: FnMut(A, T) -> Fut,
    Fut: Future<Output = A>,
{
    tokio::pin!(cancel);
    let mut acc = init;
    while let Some(item) = next_or_cancel(reader, &mut cancel).await? {
        acc = f(acc, item).await;
    }
    Ok(acc)
}
