//! rs2-pipeline - pull-based typed streams for in-process data pipelines
//!
//! Producers push into a [`StreamWriter`] obtained from [`pipe`]; consumers
//! pull from a [`StreamReader`]. Readers compose through operators
//! ([`operators`], [`ReaderExt`]), are shared with [`copy`], combined with
//! [`merge`], paced with [`debounce`]/[`throttle`]/[`timeout`], and decoupled
//! from slow consumers with [`backpressure`].

pub mod error;
pub mod reader;

pub mod pipe;
pub mod sources;

pub mod operators;
pub mod multicast;
pub mod merge;
pub mod rate;
pub mod backpressure;

pub mod registry;
pub mod sink;
pub mod stream_configuration;
pub mod reader_ext;

pub use backpressure::{
    backpressure, backpressure_block, backpressure_reader, BackpressureConfig, BackpressureReader,
    BackpressureStrategy, WatermarkCallback,
};
pub use error::{StreamError, StreamResult};
pub use merge::{merge, merge_named};
pub use multicast::{copy, MulticastChild};
pub use pipe::{pipe, pipe_with_config, unbounded_pipe, PipeReader, StreamWriter};
pub use rate::{debounce, throttle, timeout};
pub use reader::{BoxReader, StreamReader};
pub use reader_ext::ReaderExt;
pub use registry::{
    concat, concat_items, register_concat_func, register_merge_func, register_split_func, split,
    TypeRegistry,
};
pub use sink::{collect, collect_all, for_each, reduce};
pub use sources::{empty, from_iter, from_slice, from_stream, from_vec, into_stream, once};
pub use stream_configuration::{PipeConfig, DEFAULT_PIPE_CAPACITY};

// Re-export async-trait so custom readers can implement `StreamReader`.
pub use async_trait::async_trait;
