//! Decorators that wrap one or more upstream readers.
//!
//! Every operator holds its upstream as a [`BoxReader`](crate::BoxReader) and
//! implements `recv`/`close` by delegation, so they nest without limit:
//!
//! ```
//! use rs2_pipeline::{collect_all, from_iter, operators::*};
//!
//! # async fn example() {
//! let reader = take(skip(filter(map(from_iter(0..100), |x| x * 3), |x| x % 2 == 0), 2), 3);
//! assert_eq!(collect_all(&reader).await.unwrap(), vec![12, 18, 24]);
//! # }
//! ```
//!
//! Operator state is private to the instance; an operator is meant to be
//! pulled by one consumer at a time. Use [`copy`](crate::copy) to share.
//! `SourceEof` signals from a merged upstream are passed through untouched and
//! never counted as elements.

mod combine;
mod distinct;
mod slice;
mod transform;

pub use combine::{batch, window, zip_with};
pub use distinct::{distinct, distinct_by};
pub use slice::{skip, skip_while, take, take_while};
pub use transform::{filter, flat_map, map, reduce};

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
