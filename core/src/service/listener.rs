//! TCP listener that reports when it has been closed.

use std::io;
use std::net::SocketAddr;

use axum::serve::Listener;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Wraps the bound listener; when it drops, every [`ClosedSignal`] resolves.
///
/// `axum::serve` drops its listener as soon as graceful shutdown begins, so
/// the signal fires once the port is free, not when the last request ends.
pub(crate) struct TrackedListener {
    // Declared first: the socket is closed before the signal fires.
    inner: TcpListener,
    _open: watch::Sender<()>,
}

impl TrackedListener {
    pub(crate) fn new(inner: TcpListener, open: watch::Sender<()>) -> Self {
        Self { inner, _open: open }
    }
}

impl Listener for TrackedListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (TcpStream, SocketAddr) {
        Listener::accept(&mut self.inner).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Listener::local_addr(&self.inner)
    }
}

/// Resolves once the matching listener (or the task that would have bound
/// it) is gone.
#[derive(Clone)]
pub(crate) struct ClosedSignal(watch::Receiver<()>);

impl ClosedSignal {
    pub(crate) fn channel() -> (watch::Sender<()>, Self) {
        let (tx, rx) = watch::channel(());
        (tx, Self(rx))
    }

    pub(crate) async fn wait(mut self) {
        // Nothing is ever sent; `changed` only returns when the sender drops.
        while self.0.changed().await.is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_fires_after_socket_closed() {
        let inner = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = inner.local_addr().unwrap();
        let (tx, closed) = ClosedSignal::channel();
        let listener = TrackedListener::new(inner, tx);
        assert_eq!(Listener::local_addr(&listener).unwrap(), addr);

        drop(listener);
        closed.wait().await;
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_signal_fires_when_sender_dropped_unbound() {
        let (tx, closed) = ClosedSignal::channel();
        let waiter = closed.clone();
        drop(tx);
        waiter.wait().await;
        closed.wait().await;
    }
}
