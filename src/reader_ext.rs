//! Method-call syntax for every operator, so pipelines read left to right.

use futures_util::stream::BoxStream;
use std::hash::Hash;
use std::time::Duration;

use crate::backpressure::{backpressure, BackpressureConfig};
use crate::error::StreamResult;
use crate::merge::merge;
use crate::multicast::copy;
use crate::operators;
use crate::rate::{debounce, throttle, timeout};
use crate::reader::BoxReader;
use crate::sources::into_stream;

/// Extension trait exposing every operator as a method on [`BoxReader`]
///
/// ```
/// use rs2_pipeline::{collect_all, from_iter, ReaderExt};
///
/// # async fn example() {
/// let batches = from_iter(1..=7).filter(|x| x % 2 == 1).batch(3);
/// assert_eq!(collect_all(&batches).await.unwrap(), vec![vec![1, 3, 5], vec![7]]);
/// # }
/// ```
pub trait ReaderExt<T: Send + 'static>: Sized {
    /// Convert into the boxed reader the operators wrap
    fn into_reader(self) -> BoxReader<T>;

    /// Map elements with a function
    fn map<U, F>(self, f: F) -> BoxReader<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        operators::map(self.into_reader(), f)
    }

    /// Keep only elements matching the predicate
    fn filter<P>(self, predicate: P) -> BoxReader<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        operators::filter(self.into_reader(), predicate)
    }

    /// Map each element to an iterator and flatten the results
    fn flat_map<U, I, F>(self, f: F) -> BoxReader<U>
    where
        U: Send + 'static,
        I: IntoIterator<Item = U>,
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        operators::flat_map(self.into_reader(), f)
    }

    /// Fold the stream into a single emitted value, see [`operators::reduce`].
    fn reduce<A, F>(self, init: A, f: F) -> BoxReader<A>
    where
        A: Send + 'static,
        F: Fn(A, T) -> A + Send + Sync + 'static,
    {
        operators::reduce(self.into_reader(), init, f)
    }

    /// Emit at most the first `n` elements
    fn take(self, n: usize) -> BoxReader<T> {
        operators::take(self.into_reader(), n)
    }

    /// Discard the first `n` elements
    fn skip(self, n: usize) -> BoxReader<T> {
        operators::skip(self.into_reader(), n)
    }

    /// Emit elements until the predicate first fails
    fn take_while<P>(self, predicate: P) -> BoxReader<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        operators::take_while(self.into_reader(), predicate)
    }

    /// Discard elements while the predicate holds
    fn skip_while<P>(self, predicate: P) -> BoxReader<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        operators::skip_while(self.into_reader(), predicate)
    }

    /// Drop elements equal to one already seen, using `equals`
    fn distinct<E>(self, equals: E) -> BoxReader<T>
    where
        T: Clone,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        operators::distinct(self.into_reader(), equals)
    }

    /// Drop elements whose key has already been seen
    fn distinct_by<K, F>(self, key_fn: F) -> BoxReader<T>
    where
        K: Hash + Eq + Send + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        operators::distinct_by(self.into_reader(), key_fn)
    }

    /// Pair elements with `other` and combine them, ending with the shorter side
    fn zip_with<B, O, F>(self, other: BoxReader<B>, combine: F) -> BoxReader<O>
    where
        B: Send + 'static,
        O: Send + 'static,
        F: Fn(T, B) -> O + Send + Sync + 'static,
    {
        operators::zip_with(self.into_reader(), other, combine)
    }

    /// Group elements into chunks of `size`; the last chunk may be shorter
    fn batch(self, size: usize) -> BoxReader<Vec<T>> {
        operators::batch(self.into_reader(), size)
    }

    /// Emit sliding windows of `size` elements
    fn window(self, size: usize) -> BoxReader<Vec<T>>
    where
        T: Clone,
    {
        operators::window(self.into_reader(), size)
    }

    /// Fail a read that takes longer than `duration`
    fn timeout(self, duration: Duration) -> BoxReader<T> {
        timeout(self.into_reader(), duration)
    }

    /// Emit the latest element once upstream has been quiet for `duration`
    fn debounce(self, duration: Duration) -> BoxReader<T> {
        debounce(self.into_reader(), duration)
    }

    /// Emit at most one element per `duration`, dropping the rest
    fn throttle(self, duration: Duration) -> BoxReader<T> {
        throttle(self.into_reader(), duration)
    }

    /// Buffer through a backpressure stage configured by `config`
    fn backpressure(self, config: BackpressureConfig) -> BoxReader<T> {
        backpressure(self.into_reader(), config)
    }

    /// Share this reader among `n` readers, see [`copy`](crate::copy).
    fn copy(self, n: usize) -> Vec<BoxReader<T>>
    where
        T: Clone + Sync,
    {
        copy(self.into_reader(), n)
    }

    /// Round-robin this reader with `others`; branches are named by position,
    /// this reader being `"0"`.
    fn merge(self, others: Vec<BoxReader<T>>) -> BoxReader<T> {
        let mut sources = Vec::with_capacity(others.len() + 1);
        sources.push(self.into_reader());
        sources.extend(others);
        merge(sources)
    }

    /// Adapt into a `futures` stream of results
    fn into_stream(self) -> BoxStream<'static, StreamResult<T>> {
        into_stream(self.into_reader())
    }
}

impl<T: Send + 'static> ReaderExt<T> for BoxReader<T> {
    fn into_reader(self) -> BoxReader<T> {
        self
    }
}
