//! Periodic flush and backup.

use super::Shared;
use crate::error::CoreResult;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) struct Maintenance {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Maintenance {
    /// Starts the ticker, or returns `None` when both intervals are zero.
    pub(crate) fn start(shared: Arc<Shared>) -> CoreResult<Option<Self>> {
        let save_every = shared.config.save_interval;
        let backup_every = shared.config.backup_interval;
        let Some(tick) = [save_every, backup_every]
            .into_iter()
            .filter(|d| !d.is_zero())
            .min()
        else {
            return Ok(None);
        };

        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("fleetstore-maintenance".to_string())
            .spawn(move || {
                let mut last_save = Instant::now();
                let mut last_backup = Instant::now();
                loop {
                    match stopped.recv_timeout(tick) {
                        Err(RecvTimeoutError::Timeout) => {}
                        // Explicit stop or handle dropped.
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if due(save_every, last_save) {
                        last_save = Instant::now();
                        if shared.is_dirty() && shared.connected() {
                            // Errors are logged and counted by the write path.
                            let _ = shared.write_document();
                        }
                    }
                    if due(backup_every, last_backup) {
                        last_backup = Instant::now();
                        let ctx = shared.background_ctx.clone();
                        if let Err(err) = shared.backup(&ctx) {
                            tracing::warn!(error = %err, "periodic backup failed");
                        }
                    }
                }
            })?;

        Ok(Some(Self { stop, handle }))
    }

    pub(crate) fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            tracing::error!("maintenance thread panicked");
        }
    }
}

fn due(interval: Duration, last: Instant) -> bool {
    !interval.is_zero() && last.elapsed() >= interval
}
