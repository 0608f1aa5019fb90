//! Operators that group elements: zip_with, batch and window.
//!
//! All three pull their upstream strictly sequentially, so upstream order is kept.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::lock;
use crate::error::StreamResult;
use crate::reader::{BoxReader, Latch, StreamReader, Terminal};

struct ZipReader<A, B, F> {
    left: BoxReader<A>,
    right: BoxReader<B>,
    combine: F,
    /// Left element waiting for its partner, kept if the right read is interrupted.
    pending_left: Mutex<Option<A>>,
    latch: Latch,
}

#[async_trait]
impl<A, B, O, F> StreamReader<O> for ZipReader<A, B, F>
where
    A: Send + 'static,
    B: Send + 'static,
    O: Send + 'static,
    F: Fn(A, B) -> O + Send + Sync + 'static,
{
    async fn recv(&self) -> StreamResult<Option<O>> {
        if let Some(done) = self.latch.get() {
            return done;
        }

        let parked = lock(&self.pending_left).is_some();
        if !parked {
            match self.left.recv().await {
                Ok(Some(item)) => *lock(&self.pending_left) = Some(item),
                other => return self.latch.observe(other.map(|_| None)),
            }
        }

        match self.right.recv().await {
            Ok(Some(right)) => {
                let left = lock(&self.pending_left).take();
                match left {
                    Some(left) => Ok(Some((self.combine)(left, right))),
                    None => Ok(None),
                }
            }
            other => self.latch.observe(other.map(|_| None)),
        }
    }

    fn close(&self) {
        self.left.close();
        self.right.close();
    }
}

/// Pair elements from both sides and combine them. Ends (with the ending
/// side's terminal signal) as soon as either side ends, so the output length is
/// the shorter of the two.
pub fn zip_with<A, B, O, F>(left: BoxReader<A>, right: BoxReader<B>, combine: F) -> BoxReader<O>
where
    A: Send + 'static,
    B: Send + 'static,
    O: Send + 'static,
    F: Fn(A, B) -> O + Send + Sync + 'static,
{
    Box::new(ZipReader {
        left,
        right,
        combine,
        pending_left: Mutex::new(None),
        latch: Latch::new(),
    })
}

struct BatchReader<T> {
    upstream: BoxReader<T>,
    size: usize,
    buffer: Mutex<Vec<T>>,
    latch: Latch,
}

#[async_trait]
impl<T: Send + 'static> StreamReader<Vec<T>> for BatchReader<T> {
    async fn recv(&self) -> StreamResult<Option<Vec<T>>> {
        if let Some(done) = self.latch.get() {
            return done;
        }
        loop {
            match self.upstream.recv().await {
                Ok(Some(item)) => {
                    let full = {
                        let mut buffer = lock(&self.buffer);
                        buffer.push(item);
                        if buffer.len() >= self.size {
                            Some(std::mem::replace(&mut *buffer, Vec::with_capacity(self.size)))
                        } else {
                            None
                        }
                    };
                    if full.is_some() {
                        return Ok(full);
                    }
                }
                Ok(None) => {
                    let rest = std::mem::take(&mut *lock(&self.buffer));
                    let done = self.latch.finish(Terminal::End);
                    return if rest.is_empty() { done } else { Ok(Some(rest)) };
                }
                Err(err) => return self.latch.observe(Err(err)),
            }
        }
    }

    fn close(&self) {
        self.upstream.close();
    }
}

/// Group elements into vectors of `size`. The last group may be shorter; an
/// empty upstream yields no groups at all.
///
/// # Panics
///
/// Panics if `size` is zero.
pub fn batch<T: Send + 'static>(upstream: BoxReader<T>, size: usize) -> BoxReader<Vec<T>> {
    assert!(size > 0, "batch: size must be greater than zero");
    Box::new(BatchReader {
        upstream,
        size,
        buffer: Mutex::new(Vec::with_capacity(size)),
        latch: Latch::new(),
    })
}

struct WindowReader<T> {
    upstream: BoxReader<T>,
    size: usize,
    window: Mutex<VecDeque<T>>,
    emitted: AtomicBool,
    latch: Latch,
}

#[async_trait]
impl<T: Clone + Send + 'static> StreamReader<Vec<T>> for WindowReader<T> {
    async fn recv(&self) -> StreamResult<Option<Vec<T>>> {
        if let Some(done) = self.latch.get() {
            return done;
        }
        loop {
            match self.upstream.recv().await {
                Ok(Some(item)) => {
                    let full = {
                        let mut window = lock(&self.window);
                        window.push_back(item);
                        if window.len() > self.size {
                            window.pop_front();
                        }
                        (window.len() == self.size).then(|| window.iter().cloned().collect::<Vec<_>>())
                    };
                    if full.is_some() {
                        self.emitted.store(true, Ordering::Release);
                        return Ok(full);
                    }
                }
                Ok(None) => {
                    let short = std::mem::take(&mut *lock(&self.window));
                    let done = self.latch.finish(Terminal::End);
                    if !self.emitted.swap(true, Ordering::AcqRel) && !short.is_empty() {
                        return Ok(Some(short.into_iter().collect()));
                    }
                    return done;
                }
                Err(err) => return self.latch.observe(Err(err)),
            }
        }
    }

    fn close(&self) {
        self.upstream.close();
    }
}

/// Sliding windows of `size` elements advancing by one element per output.
///
/// An upstream with fewer than `size` elements produces exactly one short
/// window holding all of them; an empty upstream produces nothing.
///
/// # Panics
///
/// Panics if `size` is zero.
pub fn window<T: Clone + Send + 'static>(upstream: BoxReader<T>, size: usize) -> BoxReader<Vec<T>> {
    assert!(size > 0, "window: size must be greater than zero");
    Box::new(WindowReader {
        upstream,
        size,
        window: Mutex::new(VecDeque::with_capacity(size)),
        emitted: AtomicBool::new(false),
        latch: Latch::new(),
    })
}
