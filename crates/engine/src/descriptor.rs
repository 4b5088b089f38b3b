// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix socket transport that passes file descriptors with `SCM_RIGHTS`.

#![allow(unsafe_code)]

use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use tokio::io::{AsyncRead, AsyncWrite, Interest, ReadBuf};
use tokio::net::UnixStream;

use crate::transport::AmpTransport;

/// Most descriptors the kernel accepts in one `SCM_RIGHTS` message.
pub const MAX_DESCRIPTORS_PER_WRITE: usize = 253;

/// A Unix stream whose writes carry queued descriptors and whose reads
/// collect received ones.
pub struct DescriptorStream {
    inner: UnixStream,
    outgoing: Vec<OwnedFd>,
    received: Vec<OwnedFd>,
}

impl DescriptorStream {
    pub fn new(inner: UnixStream) -> Self {
        Self { inner, outgoing: Vec::new(), received: Vec::new() }
    }

    /// A connected pair, for in-process peers and tests.
    pub fn pair() -> io::Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self::new(a), Self::new(b)))
    }

    pub fn get_ref(&self) -> &UnixStream {
        &self.inner
    }
}

fn recv_with_descriptors(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, Vec<OwnedFd>)> {
    let mut iov = [IoSliceMut::new(buf)];
    let mut space = nix::cmsg_space!([RawFd; MAX_DESCRIPTORS_PER_WRITE]);
    let msg = recvmsg::<()>(fd, &mut iov, Some(&mut space), MsgFlags::empty())?;

    let mut fds = Vec::new();
    for cmsg in msg.cmsgs()? {
        if let ControlMessageOwned::ScmRights(raw) = cmsg {
            // The kernel installed these descriptors for us; we own them now.
            fds.extend(raw.into_iter().map(|r| unsafe { OwnedFd::from_raw_fd(r) }));
        }
    }
    Ok((msg.bytes, fds))
}

fn send_with_descriptors(fd: RawFd, buf: &[u8], fds: &[RawFd]) -> io::Result<usize> {
    let iov = [IoSlice::new(buf)];
    let cmsgs = [ControlMessage::ScmRights(fds)];
    Ok(sendmsg::<()>(fd, &iov, &cmsgs, MsgFlags::empty(), None)?)
}

impl AsyncRead for DescriptorStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let fd = this.inner.as_raw_fd();
        loop {
            ready!(this.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match this.inner.try_io(Interest::READABLE, || recv_with_descriptors(fd, unfilled)) {
                Ok((n, fds)) => {
                    buf.advance(n);
                    this.received.extend(fds);
                    return Poll::Ready(Ok(()));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Poll::Ready(Err(e)),
            }
        }
    }
}

impl AsyncWrite for DescriptorStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.outgoing.is_empty() {
            return Pin::new(&mut this.inner).poll_write(cx, buf);
        }
        let fd = this.inner.as_raw_fd();
        let batch = this.outgoing.len().min(MAX_DESCRIPTORS_PER_WRITE);
        let raw: Vec<RawFd> = this.outgoing[..batch].iter().map(AsRawFd::as_raw_fd).collect();
        loop {
            ready!(this.inner.poll_write_ready(cx))?;
            match this.inner.try_io(Interest::WRITABLE, || send_with_descriptors(fd, buf, &raw)) {
                Ok(n) => {
                    // The kernel holds its own references once sendmsg returns.
                    this.outgoing.drain(..batch);
                    return Poll::Ready(Ok(n));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Poll::Ready(Err(e)),
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl AmpTransport for DescriptorStream {
    fn peer_label(&self) -> String {
        self.inner.peer_label()
    }

    fn host_label(&self) -> String {
        self.inner.host_label()
    }

    fn supports_descriptors(&self) -> bool {
        true
    }

    fn queue_descriptors(&mut self, fds: Vec<OwnedFd>) -> io::Result<()> {
        self.outgoing.extend(fds);
        Ok(())
    }

    fn take_received_descriptors(&mut self) -> Vec<OwnedFd> {
        std::mem::take(&mut self.received)
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
