//! Element-wise transformations: map, filter, flat_map and reduce.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Mutex;

use super::lock;
use crate::error::StreamResult;
use crate::reader::{BoxReader, Latch, StreamReader, Terminal};

struct MapReader<T, U, F> {
    upstream: BoxReader<T>,
    f: F,
    _marker: PhantomData<fn() -> U>,
}

#[async_trait]
impl<T, U, F> StreamReader<U> for MapReader<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    async fn recv(&self) -> StreamResult<Option<U>> {
        Ok(self.upstream.recv().await?.map(&self.f))
    }

    fn close(&self) {
        self.upstream.close();
    }
}

/// Apply `f` to every element.
pub fn map<T, U, F>(upstream: BoxReader<T>, f: F) -> BoxReader<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    Box::new(MapReader {
        upstream,
        f,
        _marker: PhantomData,
    })
}

struct FilterReader<T, P> {
    upstream: BoxReader<T>,
    predicate: P,
}

#[async_trait]
impl<T, P> StreamReader<T> for FilterReader<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    async fn recv(&self) -> StreamResult<Option<T>> {
        loop {
            match self.upstream.recv().await? {
                Some(item) if (self.predicate)(&item) => return Ok(Some(item)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    fn close(&self) {
        self.upstream.close();
    }
}

/// Keep only the elements for which `predicate` holds.
pub fn filter<T, P>(upstream: BoxReader<T>, predicate: P) -> BoxReader<T>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    Box::new(FilterReader { upstream, predicate })
}

struct FlatMapReader<T, U, F> {
    upstream: BoxReader<T>,
    f: F,
    expansion: Mutex<VecDeque<U>>,
}

#[async_trait]
impl<T, U, I, F> StreamReader<U> for FlatMapReader<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    I: IntoIterator<Item = U>,
    F: Fn(T) -> I + Send + Sync + 'static,
{
    async fn recv(&self) -> StreamResult<Option<U>> {
        loop {
            let buffered = lock(&self.expansion).pop_front();
            if let Some(item) = buffered {
                return Ok(Some(item));
            }
            // Empty expansions are skipped by pulling again.
            match self.upstream.recv().await? {
                Some(item) => {
                    let expanded = (self.f)(item);
                    lock(&self.expansion).extend(expanded);
                }
                None => return Ok(None),
            }
        }
    }

    fn close(&self) {
        lock(&self.expansion).clear();
        self.upstream.close();
    }
}

/// Expand every element into zero or more elements.
pub fn flat_map<T, U, I, F>(upstream: BoxReader<T>, f: F) -> BoxReader<U>
where
    T: Send + 'static,
    U: Send + 'static,
    I: IntoIterator<Item = U>,
    F: Fn(T) -> I + Send + Sync + 'static,
{
    Box::new(FlatMapReader {
        upstream,
        f,
        expansion: Mutex::new(VecDeque::new()),
    })
}

struct ReduceReader<T, A, F> {
    upstream: BoxReader<T>,
    f: F,
    acc: Mutex<Option<A>>,
    latch: Latch,
}

#[async_trait]
impl<T, A, F> StreamReader<A> for ReduceReader<T, A, F>
where
    T: Send + 'static,
    A: Send + 'static,
    F: Fn(A, T) -> A + Send + Sync + 'static,
{
    async fn recv(&self) -> StreamResult<Option<A>> {
        if let Some(done) = self.latch.get() {
            return done;
        }
        loop {
            match self.upstream.recv().await? {
                Some(item) => {
                    let current = lock(&self.acc).take();
                    if let Some(current) = current {
                        let next = (self.f)(current, item);
                        *lock(&self.acc) = Some(next);
                    }
                }
                None => {
                    let total = lock(&self.acc).take();
                    let done = self.latch.finish(Terminal::End);
                    return match total {
                        Some(total) => Ok(Some(total)),
                        None => done,
                    };
                }
            }
        }
    }

    fn close(&self) {
        self.upstream.close();
    }
}

/// Fold the whole upstream into one value, emitted once upstream ends.
///
/// An empty upstream yields `init`. Upstream errors are passed through and the
/// partial accumulator is kept, so a `recv` after a `SourceEof` continues the fold.
pub fn reduce<T, A, F>(upstream: BoxReader<T>, init: A, f: F) -> BoxReader<A>
where
    T: Send + 'static,
    A: Send + 'static,
    F: Fn(A, T) -> A + Send + Sync + 'static,
{
    Box::new(ReduceReader {
        upstream,
        f,
        acc: Mutex::new(Some(init)),
        latch: Latch::new(),
    })
}
