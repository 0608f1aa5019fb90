//! Reader/writer pairs over a shared buffer.
//!
//! A pipe is the basic way to get data into a pipeline: a producer task holds
//! the [`StreamWriter`], the consumer holds the reader returned next to it.
//!
//! ```
//! use rs2_pipeline::{pipe, collect_all};
//!
//! # async fn example() {
//! let (reader, writer) = pipe::<u32>(4);
//! tokio::spawn(async move {
//!     for i in 0..3 {
//!         writer.send(i).await.unwrap();
//!     }
//!     writer.close();
//! });
//! assert_eq!(collect_all(&reader).await.unwrap(), vec![0, 1, 2]);
//! # }
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::error::{StreamError, StreamResult};
use crate::reader::{closed_result, BoxReader, Latch, StreamReader, Terminal};
use crate::stream_configuration::PipeConfig;

struct PipeState<T> {
    buffer: VecDeque<T>,
    sent: u64,
    taken: u64,
    writer_closed: Option<Terminal>,
    reader_closed: bool,
}

struct PipeShared<T> {
    state: Mutex<PipeState<T>>,
    /// An item was pushed or the pair was closed.
    readable: Notify,
    /// An item was taken or the pair was closed.
    writable: Notify,
    capacity: Option<usize>,
    writers: AtomicUsize,
}

impl<T> PipeShared<T> {
    fn lock(&self) -> MutexGuard<'_, PipeState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake_all(&self) {
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    fn close_writer(&self, terminal: Terminal) {
        {
            let mut state = self.lock();
            if state.writer_closed.is_some() {
                return;
            }
            if let Terminal::Failed(err) = &terminal {
                log::debug!("pipe closed with error: {}", err);
            }
            state.writer_closed = Some(terminal);
        }
        self.wake_all();
    }

    fn close_reader(&self) {
        let discarded = {
            let mut state = self.lock();
            if state.reader_closed {
                return;
            }
            state.reader_closed = true;
            std::mem::take(&mut state.buffer)
        };
        if !discarded.is_empty() {
            log::debug!("pipe reader closed, discarding {} buffered items", discarded.len());
        }
        self.wake_all();
    }
}

/// Producer side of a pipe.
///
/// Cloning a writer adds another producer. Closing any clone closes the pair;
/// when the last clone is dropped the pair is closed with the plain end marker.
pub struct StreamWriter<T> {
    shared: Arc<PipeShared<T>>,
}

impl<T: Send + 'static> StreamWriter<T> {
    /// Send one item, waiting for buffer space (or, for a rendezvous pipe,
    /// until the item has been received).
    ///
    /// Fails with [`StreamError::Closed`] once either side has been closed.
    pub async fn send(&self, item: T) -> StreamResult<()> {
        let slots = self.shared.capacity.map(|capacity| capacity.max(1));

        let ticket = loop {
            let notified = self.shared.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.lock();
                if state.reader_closed || state.writer_closed.is_some() {
                    return Err(StreamError::Closed);
                }
                if slots.map_or(true, |slots| state.buffer.len() < slots) {
                    state.buffer.push_back(item);
                    state.sent += 1;
                    let ticket = state.sent;
                    drop(state);
                    self.shared.readable.notify_waiters();
                    break ticket;
                }
            }

            notified.await;
        };

        if self.shared.capacity != Some(0) {
            return Ok(());
        }

        loop {
            let notified = self.shared.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.shared.lock();
                if state.taken >= ticket {
                    return Ok(());
                }
                if state.reader_closed {
                    return Err(StreamError::Closed);
                }
            }

            notified.await;
        }
    }

    /// Close the pair. Buffered items are still delivered before the end marker.
    pub fn close(&self) {
        self.shared.close_writer(Terminal::End);
    }

    /// Close the pair so that readers see `err` after the buffered items.
    pub fn close_with_error(&self, err: StreamError) {
        self.shared.close_writer(Terminal::Failed(err));
    }

    /// Whether either side has been closed.
    pub fn is_closed(&self) -> bool {
        let state = self.shared.lock();
        state.reader_closed || state.writer_closed.is_some()
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the pair, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.shared.capacity
    }
}

impl<T> Clone for StreamWriter<T> {
    fn clone(&self) -> Self {
        self.shared.writers.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for StreamWriter<T> {
    fn drop(&mut self) {
        if self.shared.writers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.close_writer(Terminal::End);
        }
    }
}

/// Consumer side of a pipe.
pub struct PipeReader<T> {
    shared: Arc<PipeShared<T>>,
    latch: Latch,
}

#[async_trait]
impl<T: Send + 'static> StreamReader<T> for PipeReader<T> {
    async fn recv(&self) -> StreamResult<Option<T>> {
        if let Some(done) = self.latch.get() {
            return done;
        }

        loop {
            let notified = self.shared.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.lock();
                if state.reader_closed {
                    return closed_result(&self.latch);
                }
                if let Some(item) = state.buffer.pop_front() {
                    state.taken += 1;
                    drop(state);
                    self.shared.writable.notify_waiters();
                    return Ok(Some(item));
                }
                if let Some(terminal) = state.writer_closed.clone() {
                    drop(state);
                    return self.latch.finish(terminal);
                }
            }

            notified.await;
        }
    }

    fn close(&self) {
        self.shared.close_reader();
    }
}

impl<T> Drop for PipeReader<T> {
    fn drop(&mut self) {
        self.shared.close_reader();
    }
}

/// Create a bounded reader/writer pair. `capacity == 0` is a rendezvous.
pub fn pipe<T: Send + 'static>(capacity: usize) -> (BoxReader<T>, StreamWriter<T>) {
    pipe_with_config(PipeConfig::bounded(capacity))
}

/// Create a reader/writer pair with no limit on buffered items.
pub fn unbounded_pipe<T: Send + 'static>() -> (BoxReader<T>, StreamWriter<T>) {
    pipe_with_config(PipeConfig::unbounded())
}

/// Create a reader/writer pair from a [`PipeConfig`].
pub fn pipe_with_config<T: Send + 'static>(config: PipeConfig) -> (BoxReader<T>, StreamWriter<T>) {
    let shared = Arc::new(PipeShared {
        state: Mutex::new(PipeState {
            buffer: VecDeque::with_capacity(config.capacity.unwrap_or(0).min(1024)),
            sent: 0,
            taken: 0,
            writer_closed: None,
            reader_closed: false,
        }),
        readable: Notify::new(),
        writable: Notify::new(),
        capacity: config.capacity,
        writers: AtomicUsize::new(1),
    });

    let reader = PipeReader {
        shared: Arc::clone(&shared),
        latch: Latch::new(),
    };
    (Box::new(reader), StreamWriter { shared })
}
