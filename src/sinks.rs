//! Ready-made sinks.
//!
//! These are mostly useful at the end of a pipeline under test, or to discard a stream while still
//! counting it. Any other [`Service`] can be used as a sink; requests can be transformed on their
//! way to it with [`ServiceExt::map_request`](tower::ServiceExt::map_request). Items are filtered
//! before they reach a dispatcher, e.g. with [`Iterator::filter`] ahead of `stream`.

use std::{
    convert::Infallible,
    fmt, future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    task::{Context, Poll},
};

use tower::Service;

/// A sink recording every request it receives, in the order received.
///
/// Clones share the same record, so a clone can be handed to a dispatcher while the original is
/// kept around to inspect what was delivered. Not meant for large streams: everything is kept
/// in memory.
pub struct Collector<R> {
    items: Arc<Mutex<Vec<R>>>,
}

impl<R> Collector<R> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of requests recorded so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Takes the recorded requests, leaving the record empty.
    pub fn take(&self) -> Vec<R> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<R>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: Clone> Collector<R> {
    /// A copy of the recorded requests.
    pub fn items(&self) -> Vec<R> {
        self.lock().clone()
    }
}

impl<R> Service<R> for Collector<R> {
    type Response = ();
    type Error = Infallible;
    type Future = future::Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: R) -> Self::Future {
        self.lock().push(req);
        future::ready(Ok(()))
    }
}

impl<R> Default for Collector<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for Collector<R> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for Collector<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Collector").field(&*self.lock()).finish()
    }
}

/// A sink discarding every batch, counting batches and items as it does so.
#[derive(Clone, Debug, Default)]
pub struct Counter {
    batches: Arc<AtomicUsize>,
    items: Arc<AtomicUsize>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::Acquire)
    }

    pub fn items(&self) -> usize {
        self.items.load(Ordering::Acquire)
    }
}

impl<T> Service<Vec<T>> for Counter {
    type Response = ();
    type Error = Infallible;
    type Future = future::Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, batch: Vec<T>) -> Self::Future {
        self.items.fetch_add(batch.len(), Ordering::AcqRel);
        self.batches.fetch_add(1, Ordering::AcqRel);
        future::ready(Ok(()))
    }
}

/// A sink that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Noop;

/// Returns a sink that does nothing.
pub fn noop() -> Noop {
    Noop
}

impl<R> Service<R> for Noop {
    type Response = ();
    type Error = Infallible;
    type Future = future::Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: R) -> Self::Future {
        future::ready(Ok(()))
    }
}
