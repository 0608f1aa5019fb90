//! De-duplication operators. The first occurrence wins and order is kept.

use async_trait::async_trait;
use std::collections::HashSet;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Mutex;

use super::lock;
use crate::error::StreamResult;
use crate::reader::{BoxReader, StreamReader};

struct DistinctReader<T, E> {
    upstream: BoxReader<T>,
    equals: E,
    seen: Mutex<Vec<T>>,
}

#[async_trait]
impl<T, E> StreamReader<T> for DistinctReader<T, E>
where
    T: Clone + Send + 'static,
    E: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    async fn recv(&self) -> StreamResult<Option<T>> {
        loop {
            let Some(item) = self.upstream.recv().await? else {
                return Ok(None);
            };
            let fresh = {
                let mut seen = lock(&self.seen);
                let fresh = !seen.iter().any(|prev| (self.equals)(prev, &item));
                if fresh {
                    seen.push(item.clone());
                }
                fresh
            };
            if fresh {
                return Ok(Some(item));
            }
        }
    }

    fn close(&self) {
        lock(&self.seen).clear();
        self.upstream.close();
    }
}

/// Drop elements equal (per `equals`) to one already emitted.
///
/// Every emitted element is remembered and compared linearly, so memory and
/// per-element cost grow with the number of distinct values.
pub fn distinct<T, E>(upstream: BoxReader<T>, equals: E) -> BoxReader<T>
where
    T: Clone + Send + 'static,
    E: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    Box::new(DistinctReader {
        upstream,
        equals,
        seen: Mutex::new(Vec::new()),
    })
}

struct DistinctByReader<T, K, F> {
    upstream: BoxReader<T>,
    key_fn: F,
    seen: Mutex<HashSet<K>>,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T, K, F> StreamReader<T> for DistinctByReader<T, K, F>
where
    T: Send + 'static,
    K: Hash + Eq + Send + 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    async fn recv(&self) -> StreamResult<Option<T>> {
        loop {
            let Some(item) = self.upstream.recv().await? else {
                return Ok(None);
            };
            if lock(&self.seen).insert((self.key_fn)(&item)) {
                return Ok(Some(item));
            }
        }
    }

    fn close(&self) {
        lock(&self.seen).clear();
        self.upstream.close();
    }
}

/// Drop elements whose key (per `key_fn`) has already been seen.
pub fn distinct_by<T, K, F>(upstream: BoxReader<T>, key_fn: F) -> BoxReader<T>
where
    T: Send + 'static,
    K: Hash + Eq + Send + 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    Box::new(DistinctByReader {
        upstream,
        key_fn,
        seen: Mutex::new(HashSet::new()),
        _marker: PhantomData,
    })
}
