//! Backpressure: a bounded re-buffering stage between a producer and a slower
//! consumer, with a configurable overflow strategy and watermark callbacks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::error::{StreamError, StreamResult};
use crate::reader::{closed_result, BoxReader, CloseSignal, Latch, StreamReader, Terminal};

/// What to do when the buffer is full and another element arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackpressureStrategy {
    /// Block the filling task until the consumer frees a slot. Never loses data.
    Block,
    /// Discard the newly arrived element
    Drop,
    /// Evict the oldest buffered element to make room
    DropOldest,
    /// End the stream with [`StreamError::Backpressure`]
    Error,
}

/// Callback invoked with the buffer occupancy when a watermark is crossed.
pub type WatermarkCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Configuration for a backpressure stage
#[derive(Clone)]
pub struct BackpressureConfig {
    pub strategy: BackpressureStrategy,
    pub buffer_size: usize,
    /// Occupancy at or below which `on_low_watermark` fires (after a high crossing)
    pub low_watermark: Option<usize>,
    /// Occupancy at or above which `on_high_watermark` fires
    pub high_watermark: Option<usize>,
    pub on_high_watermark: Option<WatermarkCallback>,
    pub on_low_watermark: Option<WatermarkCallback>,
}

impl BackpressureConfig {
    pub fn new(strategy: BackpressureStrategy, buffer_size: usize) -> Self {
        Self {
            strategy,
            buffer_size,
            low_watermark: None,
            high_watermark: None,
            on_high_watermark: None,
            on_low_watermark: None,
        }
    }

    pub fn with_watermarks(mut self, low: usize, high: usize) -> Self {
        self.low_watermark = Some(low);
        self.high_watermark = Some(high);
        self
    }

    pub fn on_high_watermark(mut self, callback: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_high_watermark = Some(Arc::new(callback));
        self
    }

    pub fn on_low_watermark(mut self, callback: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_low_watermark = Some(Arc::new(callback));
        self
    }
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self::new(BackpressureStrategy::Block, 100).with_watermarks(25, 75)
    }
}

impl fmt::Debug for BackpressureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackpressureConfig")
            .field("strategy", &self.strategy)
            .field("buffer_size", &self.buffer_size)
            .field("low_watermark", &self.low_watermark)
            .field("high_watermark", &self.high_watermark)
            .field("on_high_watermark", &self.on_high_watermark.is_some())
            .field("on_low_watermark", &self.on_low_watermark.is_some())
            .finish()
    }
}

struct BufferState<T> {
    queue: VecDeque<StreamResult<T>>,
    terminal: Option<Terminal>,
    above_high: bool,
}

struct Shared<T> {
    config: BackpressureConfig,
    state: Mutex<BufferState<T>>,
    readable: Notify,
    writable: Notify,
    closed: CloseSignal,
    dropped: AtomicU64,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, BufferState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, terminal: Terminal) {
        {
            let mut state = self.lock();
            if state.terminal.is_none() {
                state.terminal = Some(terminal);
            }
        }
        self.readable.notify_waiters();
    }

    /// Edge-triggered high watermark check, called after a push.
    fn crossed_high(&self, state: &mut BufferState<T>) -> Option<usize> {
        let high = self.config.high_watermark?;
        let len = state.queue.len();
        if !state.above_high && len >= high {
            state.above_high = true;
            return Some(len);
        }
        None
    }

    /// Edge-triggered low watermark check, called after a pop.
    fn crossed_low(&self, state: &mut BufferState<T>) -> Option<usize> {
        if !state.above_high {
            return None;
        }
        let len = state.queue.len();
        let rearmed = match (self.config.low_watermark, self.config.high_watermark) {
            (Some(low), _) => len <= low,
            (None, Some(high)) => len < high,
            (None, None) => true,
        };
        if rearmed {
            state.above_high = false;
            return self.config.low_watermark.map(|_| len);
        }
        None
    }

    /// Buffer one upstream result. Returns `false` once the stage has terminated.
    async fn push(&self, entry: StreamResult<T>) -> bool {
        let capacity = self.config.buffer_size;
        let mut entry = Some(entry);

        let crossed = loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if self.closed.is_fired() || state.terminal.is_some() {
                    return false;
                }
                if state.queue.len() >= capacity {
                    match self.config.strategy {
                        BackpressureStrategy::Block => {}
                        BackpressureStrategy::Drop => {
                            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                            log::warn!("backpressure buffer full, dropping newest element ({} dropped)", total);
                            return true;
                        }
                        BackpressureStrategy::DropOldest => {
                            state.queue.pop_front();
                            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                            log::warn!("backpressure buffer full, dropping oldest element ({} dropped)", total);
                        }
                        BackpressureStrategy::Error => {
                            drop(state);
                            log::debug!("backpressure buffer overflow at capacity {}", capacity);
                            self.finish(Terminal::Failed(StreamError::Backpressure { capacity }));
                            return false;
                        }
                    }
                }
                if state.queue.len() < capacity {
                    if let Some(entry) = entry.take() {
                        state.queue.push_back(entry);
                    }
                    break self.crossed_high(&mut state);
                }
            }

            notified.await;
        };

        self.readable.notify_waiters();
        if let Some(len) = crossed {
            log::debug!("backpressure high watermark crossed at {} buffered", len);
            if let Some(callback) = &self.config.on_high_watermark {
                callback(len);
            }
        }
        true
    }
}

async fn fill<T: Send + 'static>(upstream: Arc<dyn StreamReader<T>>, shared: Arc<Shared<T>>) {
    loop {
        let result = tokio::select! {
            biased;
            _ = shared.closed.fired() => break,
            result = upstream.recv() => result,
        };
        match result {
            Ok(Some(item)) => {
                if !shared.push(Ok(item)).await {
                    break;
                }
            }
            Ok(None) => {
                shared.finish(Terminal::End);
                break;
            }
            Err(err) if err.is_source_eof() => {
                if !shared.push(Err(err)).await {
                    break;
                }
            }
            Err(err) => {
                shared.finish(Terminal::Failed(err));
                break;
            }
        }
    }
    upstream.close();
    log::debug!("backpressure filler finished");
}

/// Reader side of a backpressure stage.
pub struct BackpressureReader<T> {
    shared: Arc<Shared<T>>,
    upstream: Arc<dyn StreamReader<T>>,
    latch: Latch,
}

impl<T> BackpressureReader<T> {
    /// Number of elements discarded by the `Drop`/`DropOldest` strategies so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Number of elements currently buffered.
    pub fn buffered(&self) -> usize {
        self.shared.lock().queue.len()
    }
}

#[async_trait]
impl<T: Send + 'static> StreamReader<T> for BackpressureReader<T> {
    async fn recv(&self) -> StreamResult<Option<T>> {
        if let Some(done) = self.latch.get() {
            return done;
        }

        loop {
            let notified = self.shared.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (next, crossed) = {
                let mut state = self.shared.lock();
                if self.shared.closed.is_fired() {
                    drop(state);
                    return closed_result(&self.latch);
                }
                match state.queue.pop_front() {
                    Some(entry) => {
                        let crossed = self.shared.crossed_low(&mut state);
                        (Some(entry), crossed)
                    }
                    None => match state.terminal.clone() {
                        Some(terminal) => {
                            drop(state);
                            return self.latch.finish(terminal);
                        }
                        None => (None, None),
                    },
                }
            };

            if let Some(entry) = next {
                self.shared.writable.notify_waiters();
                if let Some(len) = crossed {
                    log::debug!("backpressure low watermark crossed at {} buffered", len);
                    if let Some(callback) = &self.shared.config.on_low_watermark {
                        callback(len);
                    }
                }
                return entry.map(Some);
            }

            notified.await;
        }
    }

    fn close(&self) {
        if self.shared.closed.fire() {
            self.shared.lock().queue.clear();
            self.shared.readable.notify_waiters();
            self.shared.writable.notify_waiters();
            self.upstream.close();
        }
    }
}

impl<T> Drop for BackpressureReader<T> {
    fn drop(&mut self) {
        if self.shared.closed.fire() {
            self.shared.writable.notify_waiters();
            self.upstream.close();
        }
    }
}

/// Re-buffer `upstream` through a bounded buffer filled by a background task.
///
/// The filler starts immediately, so this must be called within a Tokio
/// runtime. Buffered elements are delivered before any terminal signal,
/// including the [`StreamError::Backpressure`] raised by the `Error` strategy.
///
/// # Panics
///
/// Panics if `config.buffer_size` is zero.
pub fn backpressure<T: Send + 'static>(upstream: BoxReader<T>, config: BackpressureConfig) -> BoxReader<T> {
    Box::new(backpressure_reader(upstream, config))
}

/// Like [`backpressure`] but returns the concrete reader, which exposes
/// [`dropped`](BackpressureReader::dropped) and
/// [`buffered`](BackpressureReader::buffered).
pub fn backpressure_reader<T: Send + 'static>(
    upstream: BoxReader<T>,
    config: BackpressureConfig,
) -> BackpressureReader<T> {
    assert!(config.buffer_size > 0, "backpressure: buffer_size must be greater than zero");
    let upstream: Arc<dyn StreamReader<T>> = Arc::from(upstream);
    let shared = Arc::new(Shared {
        state: Mutex::new(BufferState {
            queue: VecDeque::with_capacity(config.buffer_size.min(1024)),
            terminal: None,
            above_high: false,
        }),
        config,
        readable: Notify::new(),
        writable: Notify::new(),
        closed: CloseSignal::new(),
        dropped: AtomicU64::new(0),
    });
    tokio::spawn(fill(Arc::clone(&upstream), Arc::clone(&shared)));
    BackpressureReader {
        shared,
        upstream,
        latch: Latch::new(),
    }
}

/// Backpressure with the blocking strategy and no watermarks.
pub fn backpressure_block<T: Send + 'static>(upstream: BoxReader<T>, buffer_size: usize) -> BoxReader<T> {
    backpressure(upstream, BackpressureConfig::new(BackpressureStrategy::Block, buffer_size))
}
