//! Multicast fan-out: one upstream shared by N independent readers.
//!
//! Instead of buffering a copy of every element per child, the upstream is read
//! into a shared singly-linked list exactly once, and every child only holds a
//! cursor into that list:
//!
//! ```text
//!            child A cursor      child B cursor
//!                  |                   |
//!   [head] -> [ 1 ] -> [ 2 ] -> [ 3 ] -> [ 4 ] -> (next not yet read)
//! ```
//!
//! Advancing past a node whose `next` is already materialized needs no lock.
//! Advancing past the newest node initializes its `next` cell exactly once
//! (racing children wait on the same cell) while holding the parent lock for
//! the duration of one upstream read. Nodes behind the slowest cursor are
//! freed by reference counting as soon as no cursor points at them.
//!
//! Children receive clones of the shared values, so use an `Arc` payload when
//! cloning `T` is expensive.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

use crate::error::{StreamError, StreamResult};
use crate::reader::{closed_result, BoxReader, CloseSignal, Latch, StreamReader, Terminal};

enum Payload<T> {
    Head,
    Item(T),
    /// A non-terminal signal from upstream (a `SourceEof`), replayed to every child.
    Signal(StreamError),
    Terminal(Terminal),
}

struct Node<T> {
    payload: Payload<T>,
    next: OnceCell<Arc<Node<T>>>,
}

impl<T> Node<T> {
    fn new(payload: Payload<T>) -> Arc<Self> {
        Arc::new(Self {
            payload,
            next: OnceCell::new(),
        })
    }
}

impl<T> Drop for Node<T> {
    // Unlink iteratively so a long unread chain cannot overflow the stack.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

struct Parent<T> {
    upstream: BoxReader<T>,
    /// Serializes upstream reads and remembers how the upstream ended.
    terminal: tokio::sync::Mutex<Option<Terminal>>,
    open_children: AtomicUsize,
}

impl<T: Send + 'static> Parent<T> {
    async fn advance(&self, node: &Arc<Node<T>>) -> Arc<Node<T>> {
        if let Some(next) = node.next.get() {
            return Arc::clone(next);
        }
        let next = node
            .next
            .get_or_init(|| async {
                let mut terminal = self.terminal.lock().await;
                if let Some(done) = terminal.as_ref() {
                    return Node::new(Payload::Terminal(done.clone()));
                }
                let payload = match self.upstream.recv().await {
                    Ok(Some(item)) => Payload::Item(item),
                    Ok(None) => Payload::Terminal(Terminal::End),
                    Err(err) if err.is_source_eof() => Payload::Signal(err),
                    Err(err) => Payload::Terminal(Terminal::Failed(err)),
                };
                if let Payload::Terminal(done) = &payload {
                    log::debug!("multicast upstream finished: {:?}", done);
                    *terminal = Some(done.clone());
                }
                Node::new(payload)
            })
            .await;
        Arc::clone(next)
    }

    fn release_child(&self) {
        if self.open_children.fetch_sub(1, Ordering::AcqRel) == 1 {
            log::debug!("last multicast child closed, closing upstream");
            self.upstream.close();
        }
    }
}

/// One consumer of a multicast upstream; holds only a cursor into the shared list.
pub struct MulticastChild<T> {
    parent: Arc<Parent<T>>,
    cursor: Mutex<Option<Arc<Node<T>>>>,
    closed: CloseSignal,
    latch: Latch,
}

impl<T> MulticastChild<T> {
    fn cursor(&self) -> Option<Arc<Node<T>>> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_cursor(&self, node: Arc<Node<T>>) {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        // A concurrent close wins; never resurrect a released cursor.
        if cursor.is_some() {
            *cursor = Some(node);
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> StreamReader<T> for MulticastChild<T> {
    async fn recv(&self) -> StreamResult<Option<T>> {
        if let Some(done) = self.latch.get() {
            return done;
        }
        if self.closed.is_fired() {
            return closed_result(&self.latch);
        }
        let Some(current) = self.cursor() else {
            return closed_result(&self.latch);
        };
        if let Payload::Terminal(done) = &current.payload {
            return self.latch.finish(done.clone());
        }

        // An abandoned advance leaves the node's cell uninitialized for the next reader.
        let next = tokio::select! {
            biased;
            _ = self.closed.fired() => return closed_result(&self.latch),
            next = self.parent.advance(&current) => next,
        };
        drop(current);
        let result = match &next.payload {
            Payload::Item(item) => Ok(Some(item.clone())),
            Payload::Signal(err) => Err(err.clone()),
            Payload::Terminal(done) => self.latch.finish(done.clone()),
            Payload::Head => Ok(None),
        };
        self.set_cursor(next);
        result
    }

    fn close(&self) {
        self.closed.fire();
        let released = self
            .cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            self.parent.release_child();
        }
    }
}

impl<T> Drop for MulticastChild<T> {
    fn drop(&mut self) {
        let released = self
            .cursor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() && self.parent.open_children.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.parent.upstream.close();
        }
    }
}

/// Share `upstream` among `n` independent readers.
///
/// Every reader observes the same ordered elements and the same terminal
/// signal, regardless of how fast each one consumes, while the upstream is read
/// at most once per element. The upstream is closed once every child is closed.
///
/// `copy(_, 1)` returns `upstream` itself; `copy(_, 0)` closes it and returns
/// no readers.
pub fn copy<T>(upstream: BoxReader<T>, n: usize) -> Vec<BoxReader<T>>
where
    T: Clone + Send + Sync + 'static,
{
    match n {
        0 => {
            upstream.close();
            Vec::new()
        }
        1 => vec![upstream],
        _ => {
            let parent = Arc::new(Parent {
                upstream,
                terminal: tokio::sync::Mutex::new(None),
                open_children: AtomicUsize::new(n),
            });
            let head = Node::new(Payload::Head);
            (0..n)
                .map(|_| {
                    Box::new(MulticastChild {
                        parent: Arc::clone(&parent),
                        cursor: Mutex::new(Some(Arc::clone(&head))),
                        closed: CloseSignal::new(),
                        latch: Latch::new(),
                    }) as BoxReader<T>
                })
                .collect()
        }
    }
}
