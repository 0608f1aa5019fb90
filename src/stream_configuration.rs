//! Configuration types for reader/writer pairs

use serde::{Deserialize, Serialize};

/// Buffer size used by [`PipeConfig::default`].
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

/// Buffer configuration for a reader/writer pair
///
/// `capacity: None` is unbounded, `Some(0)` is a rendezvous where `send`
/// waits until the element has been received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeConfig {
    pub capacity: Option<usize>,
}

impl PipeConfig {
    pub fn bounded(capacity: usize) -> Self {
        Self { capacity: Some(capacity) }
    }

    pub fn unbounded() -> Self {
        Self { capacity: None }
    }

    pub fn rendezvous() -> Self {
        Self::bounded(0)
    }

    pub fn is_rendezvous(&self) -> bool {
        self.capacity == Some(0)
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self::bounded(DEFAULT_PIPE_CAPACITY)
    }
}
