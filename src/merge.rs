//! Fan-in: combine several readers into one by round-robin.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{StreamError, StreamResult};
use crate::reader::{closed_result, BoxReader, CloseSignal, Latch, StreamReader};
use crate::sources::empty;

struct MergeState {
    cursor: usize,
    finished: Vec<bool>,
    remaining: usize,
}

struct MergeReader<T> {
    sources: Vec<(String, BoxReader<T>)>,
    state: Mutex<MergeState>,
    closed: CloseSignal,
    latch: Latch,
}

impl<T: Send + 'static> MergeReader<T> {
    async fn next(&self) -> StreamResult<Option<T>> {
        let mut state = self.state.lock().await;
        if state.remaining == 0 {
            return Ok(None);
        }

        let count = self.sources.len();
        let mut index = state.cursor % count;
        while state.finished[index] {
            index = (index + 1) % count;
        }
        state.cursor = (index + 1) % count;

        let (name, source) = &self.sources[index];
        match source.recv().await {
            Ok(Some(item)) => Ok(Some(item)),
            Ok(None) => {
                state.finished[index] = true;
                state.remaining -= 1;
                log::debug!("merge source `{}` finished, {} remaining", name, state.remaining);
                if state.remaining == 0 {
                    Ok(None)
                } else {
                    Err(StreamError::SourceEof { name: name.clone() })
                }
            }
            Err(err) if err.is_source_eof() => Err(err),
            Err(err) => {
                log::debug!("merge source `{}` failed: {}", name, err);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<T: Send + 'static> StreamReader<T> for MergeReader<T> {
    async fn recv(&self) -> StreamResult<Option<T>> {
        if let Some(done) = self.latch.get() {
            return done;
        }
        if self.closed.is_fired() {
            return closed_result(&self.latch);
        }
        tokio::select! {
            biased;
            _ = self.closed.fired() => closed_result(&self.latch),
            result = self.next() => self.latch.observe(result),
        }
    }

    fn close(&self) {
        self.closed.fire();
        for (_, source) in &self.sources {
            source.close();
        }
    }
}

/// Round-robin over named readers.
///
/// Each `recv` reads from the next branch that has not finished. When a branch
/// ends while others are still live, `recv` returns
/// [`StreamError::SourceEof`] naming it; callers may keep reading. The plain
/// end marker is returned once the last branch ends. Any other error from a
/// branch ends the merged reader: it is returned as-is and replayed by every
/// later `recv`.
///
/// Zero readers give an exhausted reader; a single reader is returned unchanged.
pub fn merge_named<T: Send + 'static>(mut sources: Vec<(String, BoxReader<T>)>) -> BoxReader<T> {
    match sources.len() {
        0 => empty(),
        1 => sources.remove(0).1,
        count => Box::new(MergeReader {
            sources,
            state: Mutex::new(MergeState {
                cursor: 0,
                finished: vec![false; count],
                remaining: count,
            }),
            closed: CloseSignal::new(),
            latch: Latch::new(),
        }),
    }
}

/// Round-robin over readers named by their position (`"0"`, `"1"`, ...).
pub fn merge<T: Send + 'static>(sources: Vec<BoxReader<T>>) -> BoxReader<T> {
    merge_named(
        sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| (index.to_string(), source))
            .collect(),
    )
}
