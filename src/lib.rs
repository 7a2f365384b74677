#![allow(clippy::type_complexity)]

//! Collect items into fixed-size batches and hand every completed batch to a sink.
//!
//! Writing data in bulk is a common technique for improving the efficiency of certain tasks.
//! `batch-dispatch` buffers items until the buffer reaches its capacity, an explicit
//! [`commit`](Batching::commit) is requested, or the dispatcher is closed, and then forwards the
//! buffered items as one `Vec<T>` to a sink. Any [`tower::Service`] accepting `Vec<T>` can act as
//! a sink, as long as its error converts into a [`SinkError`]. A sink tells the producer to stop
//! sending data by failing with [`Refused`](error::Refused).
//!
//! Two dispatchers are provided:
//!
//! * [`Batching`] awaits the sink inline, on the task that fed the item which completed the
//!   batch. Sink failures are returned straight to that caller.
//! * [`ConcurrentBatching`] spawns every batch onto a Tokio runtime and keeps accepting items
//!   while earlier batches are processed. Failures are collected into a
//!   [`BatchError`](error::BatchError) and reported according to the [`Policy`] chosen at
//!   construction.
//!
//! ```ignore
//! let sink = Collector::new();
//! let mut batch = Batching::new(sink.clone(), 100)?;
//! batch.stream(rows).await?;
//! batch.close().await?;
//! ```

/// Export tower's alias for a type-erased error type.
pub use tower::BoxError;

pub use self::buffer::{BatchBuffer, Full};
pub use self::concurrent::ConcurrentBatching;
pub use self::error::{Error, SinkError};
pub use self::layer::{BatchLayer, ConcurrentBatchLayer};
pub use self::service::Batching;

mod buffer;
mod concurrent;
pub mod error;
mod layer;
mod message;
mod service;
pub mod sinks;
mod worker;

/// Failure propagation policy of a [`ConcurrentBatching`] dispatcher.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Policy {
    /// Stop accepting items as soon as one batch fails, and report that failure right away.
    FailFast,

    /// Accept every item regardless of failed batches, and report all failures on close.
    FailSlow,
}

impl Policy {
    /// Maps a `fail_fast` flag onto a policy.
    pub fn from_fail_fast(fail_fast: bool) -> Self {
        if fail_fast {
            Policy::FailFast
        } else {
            Policy::FailSlow
        }
    }

    /// Whether the first failure stops the dispatcher from accepting items.
    pub fn is_fail_fast(self) -> bool {
        self == Policy::FailFast
    }
}

impl Default for Policy {
    fn default() -> Self {
        Policy::FailSlow
    }
}
