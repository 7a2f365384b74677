use tokio::sync::mpsc;

use super::error::SinkError;

/// Message sent back to the dispatcher once a batch spawned on the executor is done.
#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) seq: u64,
    pub(crate) size: usize,
    pub(crate) outcome: Result<(), SinkError>,
}

pub(crate) type Tx = mpsc::UnboundedSender<Completion>;
pub(crate) type Rx = mpsc::UnboundedReceiver<Completion>;
