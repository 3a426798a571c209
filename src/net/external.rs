// SPDX-License-Identifier: MIT
//!
//! External listener lifecycle (§4.2).
//!
//! A separate socket on an all-interfaces address, serving the same
//! `axum::Router` as the loopback listener but wrapped in one extra layer
//! of middleware that stamps every request `external=true`. Starting and
//! stopping is explicit and idempotent: a concurrent start-while-running is
//! a no-op that returns the already-bound port; stopping gives the HTTP
//! server a five-second grace window before the task is forced down.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::context::mark_external;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct ExternalListenerHandle {
    port: u16,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ExternalListenerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Signal graceful shutdown and wait up to five seconds for the server
    /// task to finish; if it hasn't by then, abort it outright.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let abort_handle = self.join.abort_handle();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.join).await.is_err() {
            warn!("external listener did not shut down within the grace period; aborting");
            abort_handle.abort();
        }
    }
}

/// Bind and start the external listener, serving `app` with `external=true`
/// applied ahead of it. Returns once the socket is bound (not once the
/// server has finished — that happens on `stop()`).
pub async fn start(addr: SocketAddr, app: Router) -> io::Result<ExternalListenerHandle> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    let wrapped = app.layer(axum::middleware::from_fn(mark_external));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(async move {
        let make_service = wrapped.into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, make_service).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        // Serve errors after shutdown has begun are expected and swallowed
        // (§4.2 failure clause); anything else is logged.
        if let Err(e) = serve.await {
            warn!(error = %e, "external listener serve error");
        }
    });

    info!(port = bound.port(), "external listener started");
    Ok(ExternalListenerHandle { port: bound.port(), shutdown_tx, join })
}
