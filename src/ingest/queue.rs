//! Hand-off between producers and consumers.
//!
//! The queue closes once the coordinator and every producer have dropped
//! their senders; that close is the "producers done" signal. Records pushed
//! before the close are still delivered, so a consumer that observes
//! [`Pop::Drained`] knows both that producers are done and that the queue is empty.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};
use crate::metrics::QUEUE_SIZE;
use crate::models::RawTransferRecord;

pub fn new() -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSender(tx), QueueReceiver(Arc::new(Mutex::new(rx))))
}

#[derive(Clone)]
pub struct QueueSender(mpsc::UnboundedSender<RawTransferRecord>);

impl QueueSender {
    pub fn push(&self, record: RawTransferRecord) -> Result<()> {
        self.0.send(record).map_err(|_| Error::QueueClosed)?;
        QUEUE_SIZE.inc();
        Ok(())
    }

    /// Drops this handle. The queue closes when the last handle is gone.
    pub fn close(self) {}
}

#[derive(Debug)]
pub enum Pop {
    Record(RawTransferRecord),
    /// Nothing arrived within the wait, producers are still running.
    Empty,
    /// Producers are done and every record has been handed out.
    Drained,
}

#[derive(Clone)]
pub struct QueueReceiver(Arc<Mutex<mpsc::UnboundedReceiver<RawTransferRecord>>>);

impl QueueReceiver {
    pub async fn pop(&self, wait: Duration) -> Pop {
        let popped = tokio::time::timeout(wait, async { self.0.lock().await.recv().await }).await;

        match popped {
            Ok(Some(record)) => {
                QUEUE_SIZE.dec();
                Pop::Record(record)
            }
            Ok(None) => Pop::Drained,
            Err(_) => Pop::Empty,
        }
    }
}
