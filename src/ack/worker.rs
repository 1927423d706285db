//! Background sweeper.

use super::ledger::AckLedger;
use crate::error::{LatchError, Result};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Runs [`AckLedger::sweep`] every `interval` on a dedicated thread.
///
/// The first sweep happens one interval after spawning. A failed sweep is
/// logged and the loop keeps going; the ledger is left as it was, so the
/// next tick re-evaluates it from scratch.
pub struct SweepWorker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SweepWorker {
    pub fn spawn(ledger: Arc<AckLedger>, interval: Duration) -> Result<Self> {
        let (stop, stop_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("latch-sweeper".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => match ledger.sweep() {
                            Ok(report) if report.processed > 0 => {
                                debug!(?report, "background sweep");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "background sweep failed"),
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| LatchError::Io(format!("failed to spawn sweeper thread: {}", e)))?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stop the loop and wait for an in-flight sweep to finish.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    /// Block for as long as the worker runs. Used by `ack sweep --watch`.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn stop_and_join(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SweepWorker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
