#![allow(dead_code)]

use std::{
    fmt, future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use tower::Service;

use batch_dispatch::{error::Refused, sinks::Collector, BoxError, SinkError};

pub fn trace_init() -> tracing::subscriber::DefaultGuard {
    let subscriber = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_default(subscriber)
}

/// Accepts the first `limit` batches and refuses everything after that.
#[derive(Clone)]
pub struct RefuseAfter<R> {
    limit: usize,
    calls: Arc<AtomicUsize>,
    delivered: Collector<R>,
}

impl<R> RefuseAfter<R> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            calls: Arc::new(AtomicUsize::new(0)),
            delivered: Collector::new(),
        }
    }

    pub fn delivered(&self) -> Collector<R> {
        self.delivered.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<R> Service<R> for RefuseAfter<R> {
    type Response = ();
    type Error = SinkError;
    type Future = future::Ready<Result<(), SinkError>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: R) -> Self::Future {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.limit {
            return future::ready(Err(Refused.into()));
        }
        let _ = self.delivered.call(req);
        future::ready(Ok(()))
    }
}

/// Fails every batch starting with one of the given items, and records the others.
#[derive(Clone)]
pub struct FailOn {
    first: Vec<&'static str>,
    delivered: Collector<Vec<&'static str>>,
}

impl FailOn {
    pub fn new(first: &[&'static str]) -> Self {
        Self {
            first: first.to_vec(),
            delivered: Collector::new(),
        }
    }

    pub fn delivered(&self) -> Collector<Vec<&'static str>> {
        self.delivered.clone()
    }
}

impl Service<Vec<&'static str>> for FailOn {
    type Response = ();
    type Error = BoxError;
    type Future = future::Ready<Result<(), BoxError>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, batch: Vec<&'static str>) -> Self::Future {
        match batch.first() {
            Some(item) if self.first.contains(item) => {
                future::ready(Err(format!("batch {} failed", item).into()))
            }
            _ => {
                let _ = self.delivered.call(batch);
                future::ready(Ok(()))
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct AssertSpanSvc {
    span: tracing::Span,
}

pub struct AssertSpanError(String);

impl fmt::Debug for AssertSpanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for AssertSpanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AssertSpanError {}

impl AssertSpanSvc {
    pub fn new(span: tracing::Span) -> Self {
        Self { span }
    }

    /// Verifies the dispatcher propagates the current Span to the spawned delivery.
    fn check(&self, func: &str) -> Result<(), AssertSpanError> {
        let current_span = tracing::Span::current();
        tracing::debug!(?current_span, ?self.span, %func);
        if current_span == self.span {
            return Ok(());
        }

        Err(AssertSpanError(format!(
            "{} called outside expected span\n expected: {:?}\n  current: {:?}",
            func, self.span, current_span
        )))
    }
}

impl Service<Vec<()>> for AssertSpanSvc {
    type Response = ();
    type Error = AssertSpanError;
    type Future = future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(self.check("poll_ready"))
    }

    fn call(&mut self, _: Vec<()>) -> Self::Future {
        future::ready(self.check("call"))
    }
}
