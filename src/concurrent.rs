use std::{fmt, mem, num::NonZeroUsize};

use tokio::{runtime::Handle, sync::mpsc};
use tower::{Service, ServiceExt};
use tracing::{debug, trace, warn};
use tracing_futures::Instrument;

use super::{
    buffer::BatchBuffer,
    error::{BatchError, Error, InvalidCapacity, Refused, SinkError},
    message::{Completion, Rx, Tx},
    worker::{Delivery, Reporter},
    Policy,
};

/// Collects items into batches and delivers every completed batch on a Tokio runtime.
///
/// Each completed batch is spawned as its own task, so items keep being accepted while earlier
/// batches are processed, and several batches may be delivered at the same time. The sink is
/// cloned for every batch and must therefore cope with concurrent invocations.
///
/// Failures are collected into a [`BatchError`] in the order the failing batches complete, and
/// reported according to the [`Policy`]:
///
/// * [`Policy::FailSlow`] accepts every item and reports all failures from
///   [`close`](ConcurrentBatching::close) (or [`drain`](ConcurrentBatching::drain)).
/// * [`Policy::FailFast`] reports the first failure as soon as it is noticed, from the `call` that
///   noticed it. From then on every `call` is refused.
///
/// The runtime is borrowed, not owned: the dispatcher never shuts it down.
pub struct ConcurrentBatching<S, T> {
    sink: S,
    buffer: BatchBuffer<T>,
    executor: Handle,
    policy: Policy,
    state: State,

    // Every spawned batch reports on this channel exactly once, so `in_flight` reaches zero once
    // all of them have been received.
    tx: Tx,
    rx: Rx,
    in_flight: usize,
    submitted: u64,

    failures: BatchError,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Accepting,
    Refusing,
}

impl<S, T> ConcurrentBatching<S, T>
where
    S: Service<Vec<T>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<SinkError>,
    T: Send + 'static,
{
    /// Creates a new `ConcurrentBatching` dispatcher delivering batches of up to `capacity` items
    /// to `sink`.
    ///
    /// The current Tokio runtime is used to run the deliveries, which means that this method must
    /// be called while on the Tokio runtime.
    pub fn new(sink: S, capacity: usize, policy: Policy) -> Result<Self, InvalidCapacity> {
        Self::with_executor(sink, capacity, policy, Handle::current())
    }

    /// Creates a new `ConcurrentBatching` dispatcher that spawns deliveries onto `executor`.
    pub fn with_executor(
        sink: S,
        capacity: usize,
        policy: Policy,
        executor: Handle,
    ) -> Result<Self, InvalidCapacity> {
        let buffer = BatchBuffer::new(capacity)?;
        Ok(Self::from_parts(sink, buffer, policy, executor))
    }

    pub(crate) fn from_parts(
        sink: S,
        buffer: BatchBuffer<T>,
        policy: Policy,
        executor: Handle,
    ) -> Self {
        trace!(capacity = buffer.capacity(), ?policy, "creating concurrent dispatcher");

        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sink,
            buffer,
            executor,
            policy,
            state: State::Accepting,
            tx,
            rx,
            in_flight: 0,
            submitted: 0,
            failures: BatchError::new(),
        }
    }

    pub(crate) fn with_capacity(
        sink: S,
        capacity: NonZeroUsize,
        policy: Policy,
        executor: Handle,
    ) -> Self {
        Self::from_parts(sink, BatchBuffer::with_capacity(capacity), policy, executor)
    }

    /// Adds `item` to the current batch.
    ///
    /// When the buffer is already full, its batch is spawned first and any batches finished in
    /// the meantime are collected without waiting. Under [`Policy::FailFast`] a failure collected
    /// this way is returned as [`Error::Batch`], and every later call returns
    /// [`Error::Refused`] without touching the buffer.
    pub fn call(&mut self, item: T) -> Result<(), Error> {
        if self.state == State::Refusing {
            trace!("refusing item after failure");
            return Err(Refused.into());
        }

        let mut item = item;
        loop {
            match self.buffer.add(item) {
                Ok(()) => {
                    trace!(buffered = self.buffer.len(), "item added");
                    return Ok(());
                }
                Err(full) => {
                    item = full.into_inner();
                    self.dispatch("size")?;
                }
            }
        }
    }

    /// Feeds every item of `items` through [`call`](ConcurrentBatching::call), stopping at the
    /// first error.
    pub fn stream<I>(&mut self, items: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
    {
        items.into_iter().try_for_each(|item| self.call(item))
    }

    /// Spawns the buffered items as a batch, even if the buffer is not full.
    ///
    /// Returns `Ok(false)` once a fail-fast dispatcher refuses input, and `Ok(true)` otherwise,
    /// including when there was nothing to spawn. Does not wait for the batch to complete.
    pub fn commit(&mut self) -> Result<bool, Error> {
        if self.state == State::Refusing {
            return Ok(false);
        }
        self.dispatch("commit").map(|()| true)
    }

    /// Spawns the buffered items and waits until every spawned batch has completed.
    ///
    /// Returns every failure not reported yet. Under [`Policy::FailFast`] that is at most the one
    /// failure that made the dispatcher refuse input.
    ///
    /// Dropping the returned future abandons the wait; the spawned batches still run to
    /// completion.
    pub async fn drain(&mut self) -> Result<(), Error> {
        match self.state {
            State::Accepting => {
                if let Some(batch) = self.buffer.flush() {
                    self.submit(batch, "drain");
                }
            }
            State::Refusing => {
                if let Some(batch) = self.buffer.flush() {
                    debug!(discarded = batch.len(), "discarding items buffered before refusal");
                }
            }
        }

        debug!(in_flight = self.in_flight, "waiting for batches to complete");
        while self.in_flight > 0 {
            match self.rx.recv().await {
                Some(completion) => self.complete(completion),
                None => break,
            }
        }

        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(self.take_failures())
        }
    }

    /// Drains the dispatcher and consumes it.
    ///
    /// See [`drain`](ConcurrentBatching::drain).
    pub async fn close(mut self) -> Result<(), Error> {
        debug!(
            buffered = self.buffer.len(),
            in_flight = self.in_flight,
            "closing concurrent dispatcher"
        );
        self.drain().await
    }

    fn dispatch(&mut self, reason: &str) -> Result<(), Error> {
        match self.buffer.flush() {
            Some(batch) => {
                self.submit(batch, reason);
                self.poll_completions()
            }
            None => Ok(()),
        }
    }

    fn submit(&mut self, batch: Vec<T>, reason: &str) {
        let seq = self.submitted;
        let size = batch.len();
        self.submitted += 1;
        self.in_flight += 1;

        debug!(seq, size, reason, in_flight = self.in_flight, "spawning batch");

        // Get the current Span so that we can explicitly propagate it to the spawned task. If we
        // didn't do this, events emitted while delivering the batch wouldn't be counted towards
        // the span of the caller that completed it.
        let span = tracing::Span::current();

        let reporter = Reporter::new(seq, size, self.tx.clone());
        let delivery = Delivery::new(self.sink.clone().oneshot(batch), reporter);

        // Detached: the batch runs to completion even if the dispatcher goes away.
        drop(self.executor.spawn(delivery.instrument(span)));
    }

    /// Collects completed batches without waiting.
    fn poll_completions(&mut self) -> Result<(), Error> {
        while let Ok(completion) = self.rx.try_recv() {
            self.complete(completion);

            if self.policy.is_fail_fast() && !self.failures.is_empty() {
                return Err(self.take_failures());
            }
        }
        Ok(())
    }
}

impl<S, T> ConcurrentBatching<S, T> {
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Number of items waiting for the next batch.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of spawned batches that have not reported back yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Whether a fail-fast dispatcher has seen a failure and refuses further items.
    pub fn is_refusing(&self) -> bool {
        self.state == State::Refusing
    }

    fn complete(&mut self, completion: Completion) {
        let Completion { seq, size, outcome } = completion;
        self.in_flight -= 1;

        let cause = match outcome {
            Ok(()) => {
                trace!(seq, size, in_flight = self.in_flight, "batch delivered");
                return;
            }
            Err(error) => error.into_cause(),
        };

        match (self.policy, self.state) {
            (Policy::FailSlow, _) => {
                debug!(seq, size, error = %cause, "batch failed");
                self.failures.push(cause);
            }
            (Policy::FailFast, State::Accepting) => {
                debug!(seq, size, error = %cause, "batch failed; refusing further items");
                self.state = State::Refusing;
                self.failures.push(cause);
            }
            (Policy::FailFast, State::Refusing) => {
                // The failure that caused the refusal has been reported already.
                debug!(seq, size, error = %cause, "batch failed after refusal");
            }
        }
    }

    fn take_failures(&mut self) -> Error {
        Error::Batch(mem::take(&mut self.failures))
    }
}

impl<S, T> Drop for ConcurrentBatching<S, T> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() || self.in_flight > 0 {
            warn!(
                discarded = self.buffer.len(),
                in_flight = self.in_flight,
                "concurrent dispatcher dropped without close"
            );
        }
    }
}

impl<S, T> fmt::Debug for ConcurrentBatching<S, T>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConcurrentBatching")
            .field("sink", &self.sink)
            .field("buffer", &self.buffer)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .field("in_flight", &self.in_flight)
            .field("failures", &self.failures)
            .finish()
    }
}
