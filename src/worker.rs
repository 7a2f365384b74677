use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures_core::ready;
use tracing::{debug, trace};

use super::{
    error::{Abandoned, SinkError},
    message::{Completion, Tx},
};

/// Reports the outcome of one batch to the dispatcher that submitted it.
///
/// A reporter dropped before reporting, because the sink panicked or the runtime aborted the
/// task, reports the batch as [`Abandoned`] so the dispatcher never waits for it forever.
#[derive(Debug)]
pub(crate) struct Reporter {
    seq: u64,
    size: usize,
    tx: Option<Tx>,
}

pin_project_lite::pin_project! {
    /// Task delivering one batch to the sink on the executor.
    ///
    /// The sink future runs to completion once spawned; dropping the dispatcher does not cancel
    /// it.
    pub(crate) struct Delivery<F> {
        #[pin]
        response: F,
        reporter: Reporter,
    }
}

// ===== impl Delivery =====

impl<F> Delivery<F> {
    pub(crate) fn new(response: F, reporter: Reporter) -> Self {
        Self { response, reporter }
    }
}

impl<F, R, E> Future for Delivery<F>
where
    F: Future<Output = Result<R, E>>,
    E: Into<SinkError>,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let outcome = ready!(this.response.poll(cx))
            .map(drop)
            .map_err(Into::into);
        this.reporter.report(outcome);

        Poll::Ready(())
    }
}

// ===== impl Reporter =====

impl Reporter {
    pub(crate) fn new(seq: u64, size: usize, tx: Tx) -> Self {
        Self {
            seq,
            size,
            tx: Some(tx),
        }
    }

    fn report(&mut self, outcome: Result<(), SinkError>) {
        if let Some(tx) = self.tx.take() {
            trace!(
                seq = self.seq,
                size = self.size,
                ok = outcome.is_ok(),
                "batch completed"
            );

            // The dispatcher may be gone already, in which case nobody cares about the outcome.
            let _ = tx.send(Completion {
                seq: self.seq,
                size: self.size,
                outcome,
            });
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if self.tx.is_some() {
            debug!(seq = self.seq, size = self.size, "batch abandoned");
            let abandoned = Abandoned { seq: self.seq };
            self.report(Err(SinkError::Failed(Box::new(abandoned))));
        }
    }
}
