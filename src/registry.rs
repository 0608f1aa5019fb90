//! Per-type "concatenate many into one" and "split one into many" functions.
//!
//! Streams of chunks (tokens, partial messages, ...) often need to be folded
//! back into a single value, and single values sometimes need to be fed into a
//! pipeline as several chunks. The functions used for that are looked up by
//! the element type:
//!
//! ```
//! use rs2_pipeline::{concat_items, register_concat_func};
//!
//! register_concat_func::<String>(|parts| Ok(parts.concat()));
//! assert_eq!(concat_items(vec!["ab".to_string(), "cd".to_string()]).unwrap(), "abcd");
//! ```
//!
//! Types without a registered function fall back to the last element
//! (`concat`) and to a single-element reader (`split`).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{StreamError, StreamResult};
use crate::reader::{BoxReader, StreamReader};
use crate::sink::collect_all;
use crate::sources::{from_vec, once};

/// Combines all chunks of a stream into one value.
pub type ConcatFunc<T> = Arc<dyn Fn(Vec<T>) -> StreamResult<T> + Send + Sync>;
/// Splits one value into chunks.
pub type SplitFunc<T> = Arc<dyn Fn(T) -> Vec<T> + Send + Sync>;
/// Combines two chunks into one; used by `concat` when no [`ConcatFunc`] exists.
pub type MergeFunc<T> = Arc<dyn Fn(T, T) -> StreamResult<T> + Send + Sync>;

// Distinct wrapper types give each kind of function its own `TypeId` per `T`.
struct ConcatEntry<T>(ConcatFunc<T>);
struct SplitEntry<T>(SplitFunc<T>);
struct MergeEntry<T>(MergeFunc<T>);

/// A table of per-type functions keyed by the element type.
#[derive(Default)]
pub struct TypeRegistry {
    funcs: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert<E: Any + Send + Sync>(&self, entry: E) {
        let mut funcs = self.funcs.write().unwrap_or_else(|e| e.into_inner());
        funcs.insert(TypeId::of::<E>(), Box::new(entry));
    }

    fn lookup<E: Any, R>(&self, get: impl FnOnce(&E) -> R) -> Option<R> {
        let funcs = self.funcs.read().unwrap_or_else(|e| e.into_inner());
        funcs.get(&TypeId::of::<E>())?.downcast_ref::<E>().map(get)
    }

    pub fn register_concat<T: 'static>(&self, f: impl Fn(Vec<T>) -> StreamResult<T> + Send + Sync + 'static) {
        self.insert(ConcatEntry::<T>(Arc::new(f)));
    }

    pub fn register_split<T: 'static>(&self, f: impl Fn(T) -> Vec<T> + Send + Sync + 'static) {
        self.insert(SplitEntry::<T>(Arc::new(f)));
    }

    pub fn register_merge<T: 'static>(&self, f: impl Fn(T, T) -> StreamResult<T> + Send + Sync + 'static) {
        self.insert(MergeEntry::<T>(Arc::new(f)));
    }

    pub fn concat_func<T: 'static>(&self) -> Option<ConcatFunc<T>> {
        self.lookup(|entry: &ConcatEntry<T>| Arc::clone(&entry.0))
    }

    pub fn split_func<T: 'static>(&self) -> Option<SplitFunc<T>> {
        self.lookup(|entry: &SplitEntry<T>| Arc::clone(&entry.0))
    }

    pub fn merge_func<T: 'static>(&self) -> Option<MergeFunc<T>> {
        self.lookup(|entry: &MergeEntry<T>| Arc::clone(&entry.0))
    }

    /// Combine `items` into one value.
    ///
    /// Uses the registered concat function, else folds with the registered
    /// merge function, else returns the last item. Zero items is
    /// [`StreamError::Empty`]; a single item is returned as-is.
    pub fn concat_items<T: 'static>(&self, mut items: Vec<T>) -> StreamResult<T> {
        match items.len() {
            0 => return Err(StreamError::Empty),
            1 => return items.pop().ok_or(StreamError::Empty),
            _ => {}
        }
        if let Some(concat) = self.concat_func::<T>() {
            return concat(items);
        }
        if let Some(merge) = self.merge_func::<T>() {
            let mut items = items.into_iter();
            let first = items.next().ok_or(StreamError::Empty)?;
            return items.try_fold(first, |acc, item| merge(acc, item));
        }
        log::trace!(
            "no concat function registered for {}, keeping last of {} items",
            std::any::type_name::<T>(),
            items.len()
        );
        items.pop().ok_or(StreamError::Empty)
    }

    /// Turn one value into a reader of its chunks, or a single-element reader
    /// when no split function is registered.
    pub fn split<T: Send + 'static>(&self, value: T) -> BoxReader<T> {
        match self.split_func::<T>() {
            Some(split) => from_vec(split(value)),
            None => once(value),
        }
    }
}

lazy_static::lazy_static! {
    /// Process-wide registry used by the free functions of this module.
    pub static ref GLOBAL_TYPE_REGISTRY: TypeRegistry = TypeRegistry::new();
}

/// Register the global concat function for `T`, replacing any previous one.
pub fn register_concat_func<T: 'static>(f: impl Fn(Vec<T>) -> StreamResult<T> + Send + Sync + 'static) {
    GLOBAL_TYPE_REGISTRY.register_concat(f);
}

/// Register the global split function for `T`, replacing any previous one.
pub fn register_split_func<T: 'static>(f: impl Fn(T) -> Vec<T> + Send + Sync + 'static) {
    GLOBAL_TYPE_REGISTRY.register_split(f);
}

/// Register the global pairwise merge function for `T`, replacing any previous one.
pub fn register_merge_func<T: 'static>(f: impl Fn(T, T) -> StreamResult<T> + Send + Sync + 'static) {
    GLOBAL_TYPE_REGISTRY.register_merge(f);
}

/// Combine items with the global registry, see [`TypeRegistry::concat_items`].
pub fn concat_items<T: 'static>(items: Vec<T>) -> StreamResult<T> {
    GLOBAL_TYPE_REGISTRY.concat_items(items)
}

/// Drain `reader` (skipping `SourceEof` signals) and combine its elements
/// with the global registry.
pub async fn concat<T, R>(reader: &R) -> StreamResult<T>
where
    T: Send + 'static,
    R: StreamReader<T> + ?Sized,
{
    let items = collect_all(reader).await;
    reader.close();
    concat_items(items?)
}

/// Split a value with the global registry, see [`TypeRegistry::split`].
pub fn split<T: Send + 'static>(value: T) -> BoxReader<T> {
    GLOBAL_TYPE_REGISTRY.split(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_per_type() {
        let registry = TypeRegistry::new();
        registry.register_concat::<String>(|parts| Ok(parts.concat()));
        assert!(registry.concat_func::<String>().is_some());
        assert!(registry.concat_func::<u32>().is_none());
        assert!(registry.split_func::<String>().is_none());
    }

    #[test]
    fn merge_func_folds_when_no_concat() {
        let registry = TypeRegistry::new();
        registry.register_merge::<u32>(|a, b| Ok(a + b));
        assert_eq!(registry.concat_items(vec![1u32, 2, 3, 4]), Ok(10));
    }

    #[test]
    fn concat_error_is_returned() {
        let registry = TypeRegistry::new();
        registry.register_concat::<u8>(|_| Err(StreamError::custom("bad chunks")));
        assert_eq!(registry.concat_items(vec![1u8, 2]), Err(StreamError::custom("bad chunks")));
        // A single item never reaches the concat function.
        assert_eq!(registry.concat_items(vec![7u8]), Ok(7));
    }
}
