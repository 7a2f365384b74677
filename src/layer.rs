use std::{fmt, marker::PhantomData, num::NonZeroUsize};

use tokio::runtime::Handle;
use tower::{layer::Layer, Service};

use super::{
    concurrent::ConcurrentBatching, error::InvalidCapacity, error::SinkError, service::Batching,
    Policy,
};

/// Wraps a sink into a [`Batching`] dispatcher.
///
/// [`Batching`] is fed one item at a time and is not a [`Service`] itself, so this layer has to be
/// the outermost one of a [`ServiceBuilder`](tower::ServiceBuilder) stack.
pub struct BatchLayer<T> {
    capacity: NonZeroUsize,
    _p: PhantomData<fn(T)>,
}

impl<T> BatchLayer<T> {
    /// Creates a new [`BatchLayer`] producing batches of up to `capacity` items.
    pub fn new(capacity: usize) -> Result<Self, InvalidCapacity> {
        let capacity = NonZeroUsize::new(capacity).ok_or(InvalidCapacity(capacity))?;
        Ok(Self {
            capacity,
            _p: PhantomData,
        })
    }
}

impl<S, T> Layer<S> for BatchLayer<T>
where
    S: Service<Vec<T>>,
    S::Error: Into<SinkError>,
{
    type Service = Batching<S, T>;

    fn layer(&self, sink: S) -> Self::Service {
        Batching::with_capacity(sink, self.capacity)
    }
}

impl<T> Clone for BatchLayer<T> {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            _p: PhantomData,
        }
    }
}

impl<T> fmt::Debug for BatchLayer<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BatchLayer")
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Wraps a sink into a [`ConcurrentBatching`] dispatcher.
///
/// Like [`BatchLayer`], it produces a dispatcher rather than a [`Service`], and has to be the
/// outermost layer of a stack.
///
/// The layer captures the executor when it is created, which means that
/// [`ConcurrentBatchLayer::new`] must be called while on the Tokio runtime.
pub struct ConcurrentBatchLayer<T> {
    capacity: NonZeroUsize,
    policy: Policy,
    executor: Handle,
    _p: PhantomData<fn(T)>,
}

impl<T> ConcurrentBatchLayer<T> {
    /// Creates a new [`ConcurrentBatchLayer`] spawning batches of up to `capacity` items onto the
    /// current Tokio runtime.
    pub fn new(capacity: usize, policy: Policy) -> Result<Self, InvalidCapacity> {
        Self::with_executor(capacity, policy, Handle::current())
    }

    /// Creates a new [`ConcurrentBatchLayer`] spawning batches onto `executor`.
    pub fn with_executor(
        capacity: usize,
        policy: Policy,
        executor: Handle,
    ) -> Result<Self, InvalidCapacity> {
        let capacity = NonZeroUsize::new(capacity).ok_or(InvalidCapacity(capacity))?;
        Ok(Self {
            capacity,
            policy,
            executor,
            _p: PhantomData,
        })
    }
}

impl<S, T> Layer<S> for ConcurrentBatchLayer<T>
where
    S: Service<Vec<T>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<SinkError>,
    T: Send + 'static,
{
    type Service = ConcurrentBatching<S, T>;

    fn layer(&self, sink: S) -> Self::Service {
        ConcurrentBatching::with_capacity(sink, self.capacity, self.policy, self.executor.clone())
    }
}

impl<T> Clone for ConcurrentBatchLayer<T> {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            policy: self.policy,
            executor: self.executor.clone(),
            _p: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ConcurrentBatchLayer<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConcurrentBatchLayer")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .finish()
    }
}
