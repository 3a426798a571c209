// SPDX-License-Identifier: MIT
//!
//! Stop/done-signal pairing for background sweepers.
//!
//! Every component with background work (auth-failure cleanup, session
//! expiry, token-bucket GC) owns one of these. `close()` signals the
//! background task to stop and blocks until the task acknowledges, so
//! shutdown is deterministic instead of "fire and hope the task noticed".

use tokio::sync::{oneshot, watch};

/// Handle held by the owner of a background task.
pub struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    done_rx: oneshot::Receiver<()>,
}

/// Handle held by the background task itself.
pub struct WorkerSignal {
    stop_rx: watch::Receiver<bool>,
    done_tx: Option<oneshot::Sender<()>>,
}

/// Create a linked (handle, signal) pair for one background task.
pub fn worker_pair() -> (WorkerHandle, WorkerSignal) {
    let (stop_tx, stop_rx) = watch::channel(false);
    let (done_tx, done_rx) = oneshot::channel();
    (
        WorkerHandle { stop_tx, done_rx },
        WorkerSignal { stop_rx, done_tx: Some(done_tx) },
    )
}

impl WorkerHandle {
    /// Signal the task to stop and block until it acknowledges.
    ///
    /// Idempotent-ish: calling this twice on the same handle is a logic
    /// error (the done channel can only be awaited once), so `close`
    /// consumes `self`.
    pub async fn close(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.done_rx.await;
    }
}

impl WorkerSignal {
    /// Resolves once the owning `WorkerHandle::close()` has been called.
    /// Intended for use inside `tokio::select!` alongside a ticker.
    pub async fn stopped(&mut self) {
        let _ = self.stop_rx.changed().await;
    }

    /// Acknowledge termination. Call this exactly once, right before the
    /// background task's loop returns.
    pub fn acknowledge(mut self) {
        if let Some(tx) = self.done_tx.take() {
            let _ = tx.send(());
        }
    }
}
