//! Bounded save queue with a single consumer.
//!
//! Callers push a request and, for blocking saves, wait on a private reply
//! channel. The consumer takes the first request, drains everything else
//! already queued and answers the whole batch with one write.

use super::Shared;
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Reply = SyncSender<Result<(), Arc<CoreError>>>;

struct SaveRequest {
    reply: Option<Reply>,
}

pub(crate) struct SaveQueue {
    sender: Mutex<Option<SyncSender<SaveRequest>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl SaveQueue {
    pub(crate) fn start(shared: Arc<Shared>) -> CoreResult<Self> {
        let capacity = shared.config.save_queue_capacity.max(1);
        let (sender, receiver) = mpsc::sync_channel(capacity);
        let consumer = thread::Builder::new()
            .name("fleetstore-save".to_string())
            .spawn(move || consume(&shared, &receiver))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            consumer: Mutex::new(Some(consumer)),
        })
    }

    fn sender(&self) -> CoreResult<SyncSender<SaveRequest>> {
        self.sender.lock().clone().ok_or(CoreError::SaveQueueClosed)
    }

    /// Enqueues a request and waits for the write that covers it.
    pub(crate) fn save(&self) -> CoreResult<()> {
        let (reply, answer) = mpsc::sync_channel(1);
        self.sender()?
            .send(SaveRequest { reply: Some(reply) })
            .map_err(|_| CoreError::SaveQueueClosed)?;
        match answer.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.duplicate()),
            Err(_) => Err(CoreError::SaveQueueClosed),
        }
    }

    pub(crate) fn save_async(&self) -> CoreResult<()> {
        self.sender()?
            .send(SaveRequest { reply: None })
            .map_err(|_| CoreError::SaveQueueClosed)
    }

    /// Closes the queue and waits for the consumer to drain it.
    pub(crate) fn shutdown(&self) {
        drop(self.sender.lock().take());
        if let Some(handle) = self.consumer.lock().take() {
            if handle.join().is_err() {
                tracing::error!("save consumer panicked");
            }
        }
    }
}

fn consume(shared: &Shared, receiver: &Receiver<SaveRequest>) {
    while let Ok(first) = receiver.recv() {
        let mut batch = vec![first];
        batch.extend(receiver.try_iter());

        let result = shared.write_document().map_err(Arc::new);
        shared.stats.record_save_requests(batch.len() as u64);
        if batch.len() > 1 {
            tracing::debug!(requests = batch.len(), "coalesced save requests");
        }

        for request in batch {
            if let Some(reply) = request.reply {
                // The waiter may have gone away; nothing to report to.
                let _ = reply.send(result.clone());
            }
        }
    }
    tracing::debug!("save queue closed");
}
