//! The reader contract shared by every source, operator and fan-in/fan-out.
//!
//! A reader is pulled with [`StreamReader::recv`]:
//!
//! - `Ok(Some(item))` is the next element
//! - `Ok(None)` is the end-of-stream sentinel
//! - `Err(StreamError::SourceEof { .. })` reports that one branch of a merge
//!   ended; it is recoverable and `recv` may be called again
//! - any other `Err` is terminal
//!
//! Terminal signals are sticky: once observed they are returned by every later
//! `recv` on the same reader.

use async_trait::async_trait;
use std::sync::OnceLock;
use tokio::sync::watch;

use crate::error::{StreamError, StreamResult};

/// A pull-based, possibly infinite sequence of `T`.
///
/// Both methods take `&self` so a reader can be closed from another task
/// while a `recv` is suspended; `close` must wake that `recv` promptly.
#[async_trait]
pub trait StreamReader<T>: Send + Sync {
    /// Wait for the next element or signal.
    async fn recv(&self) -> StreamResult<Option<T>>;

    /// Release the reader and everything upstream of it. Idempotent.
    fn close(&self);
}

/// A boxed, heap-allocated reader. Every constructor in this crate returns one.
pub type BoxReader<T> = Box<dyn StreamReader<T>>;

#[async_trait]
impl<T, R> StreamReader<T> for Box<R>
where
    T: Send + 'static,
    R: StreamReader<T> + ?Sized,
{
    async fn recv(&self) -> StreamResult<Option<T>> {
        (**self).recv().await
    }

    fn close(&self) {
        (**self).close()
    }
}

/// How a reader ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Terminal {
    End,
    Failed(StreamError),
}

impl Terminal {
    pub(crate) fn into_result<T>(self) -> StreamResult<Option<T>> {
        match self {
            Terminal::End => Ok(None),
            Terminal::Failed(err) => Err(err),
        }
    }
}

/// Records the first terminal signal a reader hands out and replays it.
#[derive(Debug, Default)]
pub(crate) struct Latch {
    slot: OnceLock<Terminal>,
}

impl Latch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The recorded terminal, if any.
    pub(crate) fn get<T>(&self) -> Option<StreamResult<Option<T>>> {
        self.slot.get().cloned().map(Terminal::into_result)
    }

    /// Record `terminal` unless something was recorded first; returns the winner.
    pub(crate) fn finish<T>(&self, terminal: Terminal) -> StreamResult<Option<T>> {
        self.slot.get_or_init(|| terminal).clone().into_result()
    }

    /// Pass `result` through, latching it when it is terminal.
    pub(crate) fn observe<T>(&self, result: StreamResult<Option<T>>) -> StreamResult<Option<T>> {
        match result {
            Ok(None) => self.finish(Terminal::End),
            Err(err) if !err.is_source_eof() => self.finish(Terminal::Failed(err)),
            other => other,
        }
    }
}

/// One-shot close flag that async code can wait on.
#[derive(Debug)]
pub(crate) struct CloseSignal {
    tx: watch::Sender<bool>,
}

impl CloseSignal {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Raise the flag. Returns `true` for the call that actually raised it.
    pub(crate) fn fire(&self) -> bool {
        self.tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub(crate) fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`fire`](Self::fire) has been called.
    pub(crate) async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await.map(|_| ());
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// `recv` outcome for a reader that has been closed explicitly.
pub(crate) fn closed_result<T>(latch: &Latch) -> StreamResult<Option<T>> {
    latch.get().unwrap_or(Err(StreamError::Closed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn latch_keeps_first_terminal() {
        let latch = Latch::new();
        assert!(latch.get::<u8>().is_none());
        assert_eq!(latch.observe::<u8>(Ok(Some(1))), Ok(Some(1)));
        assert!(latch.get::<u8>().is_none());
        assert_eq!(latch.observe::<u8>(Err(StreamError::Closed)), Err(StreamError::Closed));
        assert_eq!(latch.observe::<u8>(Ok(None)), Err(StreamError::Closed));
        assert_eq!(latch.get::<u8>(), Some(Err(StreamError::Closed)));
    }

    #[test]
    fn latch_ignores_source_eof() {
        let latch = Latch::new();
        let eof = StreamError::SourceEof { name: "a".into() };
        assert_eq!(latch.observe::<u8>(Err(eof.clone())), Err(eof));
        assert!(latch.get::<u8>().is_none());
    }

    #[tokio::test]
    async fn close_signal_wakes_waiters() {
        let signal = std::sync::Arc::new(CloseSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.fired().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
        // Already fired: resolves immediately.
        signal.fired().await;
    }
}
