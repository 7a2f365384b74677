use std::{fmt, num::NonZeroUsize};

use tower::{Service, ServiceExt};
use tracing::{debug, trace, warn};

use super::{
    buffer::BatchBuffer,
    error::{Error, InvalidCapacity, ServiceError, SinkError},
};

/// Collects items into batches and delivers every completed batch inline.
///
/// The sink is awaited on the task that fed the item which did not fit into the full buffer, so
/// at most one batch is in flight at any time. Batches are also delivered on an explicit
/// [`commit`](Batching::commit) and when the dispatcher is [closed](Batching::close).
///
/// There is no asynchronous drop: a dispatcher must be closed to deliver its last partial batch.
/// Dropping it with buffered items discards them.
///
/// See the module documentation for more details.
pub struct Batching<S, T> {
    sink: S,
    buffer: BatchBuffer<T>,
}

impl<S, T> Batching<S, T>
where
    S: Service<Vec<T>>,
    S::Error: Into<SinkError>,
{
    /// Creates a new `Batching` dispatcher delivering batches of up to `capacity` items to `sink`.
    pub fn new(sink: S, capacity: usize) -> Result<Self, InvalidCapacity> {
        let buffer = BatchBuffer::new(capacity)?;
        Ok(Self { sink, buffer })
    }

    pub fn with_capacity(sink: S, capacity: NonZeroUsize) -> Self {
        Self {
            sink,
            buffer: BatchBuffer::with_capacity(capacity),
        }
    }

    /// Adds `item` to the current batch.
    ///
    /// When the buffer is already full, its batch is delivered first. A sink refusal is returned
    /// as [`Error::Refused`]; `item` is then dropped and the refused batch is not retried.
    pub async fn call(&mut self, item: T) -> Result<(), Error> {
        let mut item = item;
        loop {
            match self.buffer.add(item) {
                Ok(()) => {
                    trace!(buffered = self.buffer.len(), "item added");
                    return Ok(());
                }
                Err(full) => {
                    item = full.into_inner();
                    self.flush("size").await?;
                }
            }
        }
    }

    /// Feeds every item of `items` through [`call`](Batching::call), stopping at the first error.
    pub async fn stream<I>(&mut self, items: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.call(item).await?;
        }
        Ok(())
    }

    /// Delivers the buffered items, even if the buffer is not full.
    ///
    /// Returns `Ok(false)` if the sink refused the batch, and `Ok(true)` otherwise, including when
    /// there was nothing to deliver.
    pub async fn commit(&mut self) -> Result<bool, Error> {
        match self.flush("commit").await {
            Ok(()) => Ok(true),
            Err(Error::Refused(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Commits the last batch and consumes the dispatcher.
    ///
    /// A refusal of the last batch is ignored, other sink failures are returned.
    pub async fn close(mut self) -> Result<(), Error> {
        debug!(buffered = self.buffer.len(), "closing batching dispatcher");
        self.commit().await.map(drop)
    }

    async fn flush(&mut self, reason: &str) -> Result<(), Error> {
        let batch = match self.buffer.flush() {
            Some(batch) => batch,
            None => return Ok(()),
        };

        let size = batch.len();
        debug!(size, reason, "delivering batch");

        match deliver(&mut self.sink, batch).await {
            Ok(()) => {
                trace!(size, "batch delivered");
                Ok(())
            }
            Err(SinkError::Refused(refused)) => {
                debug!(size, "sink refused batch");
                Err(refused.into())
            }
            Err(SinkError::Failed(error)) => {
                debug!(size, %error, "sink failed");
                Err(ServiceError::new(error).into())
            }
        }
    }
}

impl<S, T> Batching<S, T> {
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Number of items waiting for the next delivery.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &S {
        &self.sink
    }
}

async fn deliver<S, T>(sink: &mut S, batch: Vec<T>) -> Result<(), SinkError>
where
    S: Service<Vec<T>>,
    S::Error: Into<SinkError>,
{
    let sink = ServiceExt::<Vec<T>>::ready(sink)
        .await
        .map_err(Into::<SinkError>::into)?;
    sink.call(batch).await.map(drop).map_err(Into::into)
}

impl<S, T> Drop for Batching<S, T> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            warn!(
                discarded = self.buffer.len(),
                "batching dispatcher dropped without close"
            );
        }
    }
}

impl<S, T> fmt::Debug for Batching<S, T>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Batching")
            .field("sink", &self.sink)
            .field("buffer", &self.buffer)
            .finish()
    }
}
