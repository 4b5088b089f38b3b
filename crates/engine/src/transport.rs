// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Byte-stream transports a connection can run over.

use std::io;
use std::os::fd::OwnedFd;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

/// An ordered, reliable byte stream.
///
/// Descriptor passing is optional; transports that support it attach queued
/// descriptors to the next bytes written and hand received ones back in
/// arrival order.
pub trait AmpTransport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Label for the remote end, used in logs.
    fn peer_label(&self) -> String {
        "unknown".to_string()
    }

    /// Label for the local end, used in logs.
    fn host_label(&self) -> String {
        "unknown".to_string()
    }

    fn supports_descriptors(&self) -> bool {
        false
    }

    /// Queue descriptors to travel with the next write.
    fn queue_descriptors(&mut self, fds: Vec<OwnedFd>) -> io::Result<()> {
        drop(fds);
        Err(io::Error::new(io::ErrorKind::Unsupported, "descriptor passing not supported"))
    }

    /// Descriptors received since the last call, oldest first.
    fn take_received_descriptors(&mut self) -> Vec<OwnedFd> {
        Vec::new()
    }
}

pub type BoxedTransport = Box<dyn AmpTransport>;

impl AmpTransport for BoxedTransport {
    fn peer_label(&self) -> String {
        (**self).peer_label()
    }

    fn host_label(&self) -> String {
        (**self).host_label()
    }

    fn supports_descriptors(&self) -> bool {
        (**self).supports_descriptors()
    }

    fn queue_descriptors(&mut self, fds: Vec<OwnedFd>) -> io::Result<()> {
        (**self).queue_descriptors(fds)
    }

    fn take_received_descriptors(&mut self) -> Vec<OwnedFd> {
        (**self).take_received_descriptors()
    }
}

impl AmpTransport for TcpStream {
    fn peer_label(&self) -> String {
        self.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "tcp".to_string())
    }

    fn host_label(&self) -> String {
        self.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| "tcp".to_string())
    }
}

fn unix_label(addr: io::Result<tokio::net::unix::SocketAddr>) -> String {
    match addr.ok().and_then(|a| a.as_pathname().map(|p| p.display().to_string())) {
        Some(path) => format!("unix:{path}"),
        None => "unix".to_string(),
    }
}

impl AmpTransport for UnixStream {
    fn peer_label(&self) -> String {
        unix_label(self.peer_addr())
    }

    fn host_label(&self) -> String {
        unix_label(self.local_addr())
    }
}

impl AmpTransport for DuplexStream {
    fn peer_label(&self) -> String {
        "memory".to_string()
    }

    fn host_label(&self) -> String {
        "memory".to_string()
    }
}

/// A stream that replays `prefix` before reading from `inner`.
///
/// Bytes read past a start-TLS answer belong to the handshake; they are
/// pushed back in front of the socket before the TLS stream takes over.
pub struct Rewind<T> {
    prefix: Bytes,
    inner: T,
}

impl<T> Rewind<T> {
    pub fn new(inner: T, prefix: Bytes) -> Self {
        Self { prefix, inner }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Rewind<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.prefix.is_empty() {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix[..n]);
            this.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Rewind<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Placeholder left behind while the real transport is being upgraded.
pub(crate) struct Detached;

impl AsyncRead for Detached {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for Detached {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::ErrorKind::NotConnected.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AmpTransport for Detached {}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
