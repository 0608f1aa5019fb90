//! Prefix operators: take, skip, take_while and skip_while.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::StreamResult;
use crate::reader::{BoxReader, StreamReader};

struct TakeReader<T> {
    upstream: BoxReader<T>,
    remaining: AtomicUsize,
}

#[async_trait]
impl<T: Send + 'static> StreamReader<T> for TakeReader<T> {
    async fn recv(&self) -> StreamResult<Option<T>> {
        if self.remaining.load(Ordering::Acquire) == 0 {
            return Ok(None);
        }
        let item = self.upstream.recv().await?;
        if item.is_some() {
            self.remaining.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(item)
    }

    fn close(&self) {
        self.upstream.close();
    }
}

/// Yield at most `n` elements. Upstream is not read once `n` have been produced,
/// and `take(_, 0)` never reads it at all.
pub fn take<T: Send + 'static>(upstream: BoxReader<T>, n: usize) -> BoxReader<T> {
    Box::new(TakeReader {
        upstream,
        remaining: AtomicUsize::new(n),
    })
}

struct SkipReader<T> {
    upstream: BoxReader<T>,
    to_skip: AtomicUsize,
}

#[async_trait]
impl<T: Send + 'static> StreamReader<T> for SkipReader<T> {
    async fn recv(&self) -> StreamResult<Option<T>> {
        while self.to_skip.load(Ordering::Acquire) > 0 {
            match self.upstream.recv().await? {
                Some(_) => {
                    self.to_skip.fetch_sub(1, Ordering::AcqRel);
                }
                None => return Ok(None),
            }
        }
        self.upstream.recv().await
    }

    fn close(&self) {
        self.upstream.close();
    }
}

/// Drop the first `n` elements.
pub fn skip<T: Send + 'static>(upstream: BoxReader<T>, n: usize) -> BoxReader<T> {
    Box::new(SkipReader {
        upstream,
        to_skip: AtomicUsize::new(n),
    })
}

struct TakeWhileReader<T, P> {
    upstream: BoxReader<T>,
    predicate: P,
    finished: AtomicBool,
}

#[async_trait]
impl<T, P> StreamReader<T> for TakeWhileReader<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    async fn recv(&self) -> StreamResult<Option<T>> {
        if self.finished.load(Ordering::Acquire) {
            return Ok(None);
        }
        match self.upstream.recv().await? {
            Some(item) if (self.predicate)(&item) => Ok(Some(item)),
            Some(_) => {
                // The failing element is discarded.
                self.finished.store(true, Ordering::Release);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn close(&self) {
        self.upstream.close();
    }
}

/// Yield elements until `predicate` fails for the first time, then end.
pub fn take_while<T, P>(upstream: BoxReader<T>, predicate: P) -> BoxReader<T>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    Box::new(TakeWhileReader {
        upstream,
        predicate,
        finished: AtomicBool::new(false),
    })
}

struct SkipWhileReader<T, P> {
    upstream: BoxReader<T>,
    predicate: P,
    skipping: AtomicBool,
}

#[async_trait]
impl<T, P> StreamReader<T> for SkipWhileReader<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    async fn recv(&self) -> StreamResult<Option<T>> {
        loop {
            let item = self.upstream.recv().await?;
            if !self.skipping.load(Ordering::Acquire) {
                return Ok(item);
            }
            match item {
                Some(item) if (self.predicate)(&item) => continue,
                Some(item) => {
                    self.skipping.store(false, Ordering::Release);
                    return Ok(Some(item));
                }
                None => return Ok(None),
            }
        }
    }

    fn close(&self) {
        self.upstream.close();
    }
}

/// Drop elements while `predicate` holds, then pass everything through.
pub fn skip_while<T, P>(upstream: BoxReader<T>, predicate: P) -> BoxReader<T>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    Box::new(SkipWhileReader {
        upstream,
        predicate,
        skipping: AtomicBool::new(true),
    })
}
