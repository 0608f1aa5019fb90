//! Readers that need no background task: iterators, single values, and
//! adapters to and from `futures` streams.

use async_stream::stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::{Mutex, PoisonError};

use crate::error::StreamResult;
use crate::reader::{closed_result, BoxReader, CloseSignal, Latch, StreamReader, Terminal};

type BoxIter<T> = Box<dyn Iterator<Item = T> + Send>;

struct IterReader<T> {
    iter: Mutex<Option<BoxIter<T>>>,
    latch: Latch,
}

#[async_trait]
impl<T: Send + 'static> StreamReader<T> for IterReader<T> {
    async fn recv(&self) -> StreamResult<Option<T>> {
        if let Some(done) = self.latch.get() {
            return done;
        }
        let next = {
            let mut iter = self.iter.lock().unwrap_or_else(PoisonError::into_inner);
            match iter.as_mut() {
                Some(iter) => iter.next(),
                None => return closed_result(&self.latch),
            }
        };
        match next {
            Some(item) => Ok(Some(item)),
            None => self.latch.finish(Terminal::End),
        }
    }

    fn close(&self) {
        self.iter.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Create a reader from an iterator. The iterator is advanced lazily, one
/// element per `recv`, so infinite iterators are fine.
pub fn from_iter<I, T>(iter: I) -> BoxReader<T>
where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    T: Send + 'static,
{
    Box::new(IterReader {
        iter: Mutex::new(Some(Box::new(iter.into_iter()))),
        latch: Latch::new(),
    })
}

/// Create a reader that yields the items of a vector in order.
pub fn from_vec<T: Send + 'static>(items: Vec<T>) -> BoxReader<T> {
    from_iter(items)
}

/// Create a reader over clones of the elements of a slice.
pub fn from_slice<T: Clone + Send + 'static>(items: &[T]) -> BoxReader<T> {
    from_vec(items.to_vec())
}

/// Create a reader that yields exactly one value.
pub fn once<T: Send + 'static>(item: T) -> BoxReader<T> {
    from_iter(std::iter::once(item))
}

/// Create a reader that is exhausted from the start.
pub fn empty<T: Send + 'static>() -> BoxReader<T> {
    from_iter(std::iter::empty())
}

struct StreamAdapter<T> {
    stream: tokio::sync::Mutex<BoxStream<'static, T>>,
    closed: CloseSignal,
    latch: Latch,
}

#[async_trait]
impl<T: Send + 'static> StreamReader<T> for StreamAdapter<T> {
    async fn recv(&self) -> StreamResult<Option<T>> {
        if let Some(done) = self.latch.get() {
            return done;
        }
        if self.closed.is_fired() {
            return closed_result(&self.latch);
        }
        let mut stream = self.stream.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.fired() => closed_result(&self.latch),
            next = stream.next() => self.latch.observe(Ok(next)),
        }
    }

    fn close(&self) {
        self.closed.fire();
    }
}

/// Adapt a `futures` stream into a reader. `None` from the stream becomes the
/// end-of-stream sentinel; the stream is polled on the caller's task.
pub fn from_stream<S, T>(stream: S) -> BoxReader<T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    Box::new(StreamAdapter {
        stream: tokio::sync::Mutex::new(stream.boxed()),
        closed: CloseSignal::new(),
        latch: Latch::new(),
    })
}

/// Expose a reader as a `futures` stream of results.
///
/// Elements arrive as `Ok`, `SourceEof` signals as `Err` without ending the
/// stream, and a terminal error as a final `Err`. The reader is closed when
/// the stream finishes.
pub fn into_stream<T: Send + 'static>(reader: BoxReader<T>) -> BoxStream<'static, StreamResult<T>> {
    stream! {
        loop {
            match reader.recv().await {
                Ok(Some(item)) => yield Ok(item),
                Ok(None) => break,
                Err(err) if err.is_source_eof() => yield Err(err),
                Err(err) => {
                    yield Err(err);
                    break;
                }
            }
        }
        reader.close();
    }
    .boxed()
}
