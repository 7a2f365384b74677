//! Error types

use std::{convert::Infallible, error::Error as StdError, fmt, slice};

use thiserror::Error;

/// Returned by a sink to signal that it will not accept any further batches.
///
/// Refusal is an expected outcome rather than a bug: the producer is asked to stop feeding data.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Error)]
#[error("sink refused further input")]
pub struct Refused;

/// The outcome of a single sink invocation, as seen by a dispatcher.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink asked the producer to stop.
    #[error(transparent)]
    Refused(#[from] Refused),

    /// Any other failure raised while invoking the sink.
    #[error(transparent)]
    Failed(crate::BoxError),
}

impl SinkError {
    pub fn is_refused(&self) -> bool {
        matches!(self, SinkError::Refused(_))
    }

    /// Flattens the outcome into a plain failure cause, refusals included.
    pub(crate) fn into_cause(self) -> crate::BoxError {
        match self {
            SinkError::Refused(refused) => Box::new(refused),
            SinkError::Failed(cause) => cause,
        }
    }
}

impl From<crate::BoxError> for SinkError {
    fn from(cause: crate::BoxError) -> Self {
        SinkError::Failed(cause)
    }
}

impl From<Infallible> for SinkError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// A batch capacity of zero was requested.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("batch capacity must be positive, was {0}")]
pub struct InvalidCapacity(pub usize);

/// A unit of work spawned onto the executor ended without reporting an outcome, because the sink
/// panicked or the task was aborted by a shutting down runtime.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("batch {seq} was abandoned before the sink completed")]
pub struct Abandoned {
    pub(crate) seq: u64,
}

impl Abandoned {
    /// Submission sequence number of the abandoned batch.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// An error produced by a sink invoked inline by [`Batching`](crate::Batching).
pub struct ServiceError {
    inner: crate::BoxError,
}

impl ServiceError {
    pub(crate) fn new(inner: crate::BoxError) -> ServiceError {
        ServiceError { inner }
    }

    /// Returns the underlying sink error.
    pub fn into_inner(self) -> crate::BoxError {
        self.inner
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch sink failed: {}", self.inner)
    }
}

impl fmt::Debug for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceError").field(&self.inner).finish()
    }
}

impl StdError for ServiceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.inner)
    }
}

/// Every sink failure observed by a [`ConcurrentBatching`](crate::ConcurrentBatching)
/// dispatcher, in the order the failing batches completed.
#[derive(Default)]
pub struct BatchError {
    causes: Vec<crate::BoxError>,
}

impl BatchError {
    pub(crate) fn new() -> Self {
        BatchError { causes: Vec::new() }
    }

    pub(crate) fn push(&mut self, cause: crate::BoxError) {
        self.causes.push(cause);
    }

    /// The recorded causes, in completion order.
    pub fn causes(&self) -> &[crate::BoxError] {
        &self.causes
    }

    pub fn into_causes(self) -> Vec<crate::BoxError> {
        self.causes
    }

    pub fn len(&self) -> usize {
        self.causes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, crate::BoxError> {
        self.causes.iter()
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.causes.as_slice() {
            [] => f.pad("no batch failed"),
            [cause] => write!(f, "1 batch failed: {}", cause),
            [first, ..] => write!(
                f,
                "{} batches failed, first cause: {}",
                self.causes.len(),
                first
            ),
        }
    }
}

impl fmt::Debug for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.causes.iter()).finish()
    }
}

impl StdError for BatchError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.causes
            .first()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

impl<'a> IntoIterator for &'a BatchError {
    type Item = &'a crate::BoxError;
    type IntoIter = slice::Iter<'a, crate::BoxError>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Errors returned to the caller feeding a dispatcher.
#[derive(Debug, Error)]
pub enum Error {
    /// The sink refused further input, or a fail-fast dispatcher stopped accepting items.
    #[error(transparent)]
    Refused(#[from] Refused),

    /// A batch delivered inline failed.
    #[error(transparent)]
    Sink(#[from] ServiceError),

    /// One or more batches delivered on the executor failed.
    #[error(transparent)]
    Batch(#[from] BatchError),
}

impl Error {
    pub fn is_refused(&self) -> bool {
        matches!(self, Error::Refused(_))
    }

    /// Returns the aggregated failure, if this error carries one.
    pub fn into_batch_error(self) -> Option<BatchError> {
        match self {
            Error::Batch(e) => Some(e),
            _ => None,
        }
    }
}
