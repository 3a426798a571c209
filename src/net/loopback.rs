// SPDX-License-Identifier: MIT
//!
//! Localhost-only listener (§4.1).
//!
//! Binds the loopback interface and, on top of that, re-validates every
//! accepted connection's peer address — belt and suspenders against a
//! misconfigured bind address or a container network that makes "loopback"
//! less obvious than it sounds. Non-loopback peers are dropped immediately;
//! a single bad `accept()` never brings the listener down.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::warn;

use crate::proxy::is_loopback_ip;

/// Wraps a [`TcpListener`] so that `axum::serve`'s accept loop only ever
/// sees connections whose peer resolves to a loopback address.
pub struct LoopbackListener {
    inner: TcpListener,
}

impl LoopbackListener {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl axum::serve::Listener for LoopbackListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let (stream, peer) = match self.inner.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    // A single rejected/failed accept must not terminate
                    // the listener (§4.1 failure clause).
                    warn!(error = %e, "loopback listener accept error");
                    continue;
                }
            };

            if is_loopback_ip(peer.ip()) {
                return (stream, peer);
            }

            warn!(%peer, "closing non-loopback connection on internal listener");
            drop(stream);
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream as ClientStream;

    #[tokio::test]
    async fn accepts_loopback_connections() {
        let listener = LoopbackListener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut listener = listener;

        let client = tokio::spawn(async move { ClientStream::connect(addr).await.unwrap() });

        let (_, peer) = listener.accept().await;
        assert!(is_loopback_ip(peer.ip()));
        client.await.unwrap();
    }
}
