//! Rate limiting and timing operators: timeout, debounce and throttle.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::error::{StreamError, StreamResult};
use crate::pipe::{pipe, StreamWriter};
use crate::reader::{closed_result, BoxReader, CloseSignal, Latch, StreamReader};

type SharedReader<T> = Arc<dyn StreamReader<T>>;

struct TimeoutReader<T> {
    upstream: SharedReader<T>,
    duration: Duration,
    /// Read interrupted by the timer, resumed by the next `recv`.
    in_flight: tokio::sync::Mutex<Option<BoxFuture<'static, StreamResult<Option<T>>>>>,
}

#[async_trait]
impl<T: Send + 'static> StreamReader<T> for TimeoutReader<T> {
    async fn recv(&self) -> StreamResult<Option<T>> {
        let mut in_flight = self.in_flight.lock().await;
        let mut read = match in_flight.take() {
            Some(read) => read,
            None => {
                let upstream = Arc::clone(&self.upstream);
                Box::pin(async move { upstream.recv().await })
            }
        };
        match tokio::time::timeout(self.duration, &mut read).await {
            Ok(result) => result,
            Err(_) => {
                log::debug!("recv timed out after {:?}, parking upstream read", self.duration);
                *in_flight = Some(read);
                Err(StreamError::Timeout(self.duration))
            }
        }
    }

    fn close(&self) {
        self.upstream.close();
    }
}

/// Fail a `recv` with [`StreamError::Timeout`] when upstream takes longer than
/// `duration`.
///
/// The interrupted upstream read is neither aborted nor abandoned: it stays
/// parked and the next `recv` resumes it, so no element is lost. A timeout is
/// not terminal; the caller decides whether to retry or close.
///
/// # Panics
///
/// Panics if `duration` is zero.
pub fn timeout<T: Send + 'static>(upstream: BoxReader<T>, duration: Duration) -> BoxReader<T> {
    assert!(!duration.is_zero(), "timeout: duration must be greater than zero");
    Box::new(TimeoutReader {
        upstream: Arc::from(upstream),
        duration,
        in_flight: tokio::sync::Mutex::new(None),
    })
}

struct DebounceReader<T> {
    upstream: SharedReader<T>,
    duration: Duration,
    output: OnceLock<BoxReader<T>>,
    closed: Arc<CloseSignal>,
    latch: Latch,
}

impl<T: Send + 'static> DebounceReader<T> {
    fn output(&self) -> &BoxReader<T> {
        self.output.get_or_init(|| {
            let (reader, writer) = pipe(1);
            tokio::spawn(run_debounce(
                Arc::clone(&self.upstream),
                writer,
                self.duration,
                Arc::clone(&self.closed),
            ));
            reader
        })
    }
}

async fn run_debounce<T: Send + 'static>(
    upstream: SharedReader<T>,
    output: StreamWriter<T>,
    duration: Duration,
    closed: Arc<CloseSignal>,
) {
    let mut pending: Option<T> = None;
    let timer = sleep(duration);
    tokio::pin!(timer);
    let mut next = upstream.recv();

    loop {
        tokio::select! {
            biased;
            _ = closed.fired() => break,
            result = &mut next => {
                match result {
                    Ok(Some(item)) => {
                        pending = Some(item);
                        timer.as_mut().reset(Instant::now() + duration);
                    }
                    Ok(None) => {
                        if let Some(item) = pending.take() {
                            let _ = output.send(item).await;
                        }
                        output.close();
                        break;
                    }
                    Err(err) if err.is_source_eof() => {
                        log::trace!("debounce ignoring {}", err);
                    }
                    Err(err) => {
                        if let Some(item) = pending.take() {
                            let _ = output.send(item).await;
                        }
                        output.close_with_error(err);
                        break;
                    }
                }
                next = upstream.recv();
            }
            _ = &mut timer, if pending.is_some() => {
                if let Some(item) = pending.take() {
                    if output.send(item).await.is_err() || closed.is_fired() {
                        break;
                    }
                }
            }
        }
    }
    log::debug!("debounce task finished");
}

#[async_trait]
impl<T: Send + 'static> StreamReader<T> for DebounceReader<T> {
    async fn recv(&self) -> StreamResult<Option<T>> {
        if let Some(done) = self.latch.get() {
            return done;
        }
        if self.closed.is_fired() {
            return closed_result(&self.latch);
        }
        self.latch.observe(self.output().recv().await)
    }

    fn close(&self) {
        if self.closed.fire() {
            self.upstream.close();
            if let Some(output) = self.output.get() {
                output.close();
            }
        }
    }
}

impl<T> Drop for DebounceReader<T> {
    fn drop(&mut self) {
        if self.closed.fire() {
            self.upstream.close();
        }
    }
}

/// Emit an element only after `duration` has passed without a newer one.
///
/// Only the most recent element is kept; every arrival restarts the timer. When
/// upstream ends, the pending element is flushed immediately. The background
/// task is started by the first `recv` and stopped by `close`.
///
/// # Panics
///
/// Panics if `duration` is zero.
pub fn debounce<T: Send + 'static>(upstream: BoxReader<T>, duration: Duration) -> BoxReader<T> {
    assert!(!duration.is_zero(), "debounce: duration must be greater than zero");
    Box::new(DebounceReader {
        upstream: Arc::from(upstream),
        duration,
        output: OnceLock::new(),
        closed: Arc::new(CloseSignal::new()),
        latch: Latch::new(),
    })
}

struct ThrottleReader<T> {
    upstream: BoxReader<T>,
    duration: Duration,
    last_emit: Mutex<Option<Instant>>,
}

#[async_trait]
impl<T: Send + 'static> StreamReader<T> for ThrottleReader<T> {
    async fn recv(&self) -> StreamResult<Option<T>> {
        loop {
            let Some(item) = self.upstream.recv().await? else {
                return Ok(None);
            };
            let now = Instant::now();
            let pass = {
                let mut last_emit = self.last_emit.lock().unwrap_or_else(PoisonError::into_inner);
                let pass = last_emit.map_or(true, |last| now.duration_since(last) >= self.duration);
                if pass {
                    *last_emit = Some(now);
                }
                pass
            };
            if pass {
                return Ok(Some(item));
            }
            log::trace!("throttle dropped an element");
        }
    }

    fn close(&self) {
        self.upstream.close();
    }
}

/// Pass an element only if at least `duration` has elapsed since the last one
/// passed. Elements arriving in between are dropped, not queued.
///
/// # Panics
///
/// Panics if `duration` is zero.
pub fn throttle<T: Send + 'static>(upstream: BoxReader<T>, duration: Duration) -> BoxReader<T> {
    assert!(!duration.is_zero(), "throttle: duration must be greater than zero");
    Box::new(ThrottleReader {
        upstream,
        duration,
        last_emit: Mutex::new(None),
    })
}
