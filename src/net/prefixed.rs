//! A stream that replays already-read bytes before reading from the socket.
//!
//! The serving layer reads the first request head itself to decide whether
//! it must keep raw ownership of the connection. When it does not, the
//! connection is handed to hyper, which has to see those bytes again.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Wraps `inner`, yielding `prefix` first.
#[derive(Debug)]
pub struct PrefixedStream<T> {
    prefix: Bytes,
    inner: T,
}

impl<T> PrefixedStream<T> {
    pub fn new(prefix: Bytes, inner: T) -> Self {
        Self { prefix, inner }
    }

    /// Bytes not yet handed to the reader.
    pub fn pending(&self) -> usize {
        self.prefix.len()
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for PrefixedStream<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.prefix.has_remaining() {
            let n = self.prefix.len().min(buf.remaining());
            buf.put_slice(&self.prefix[..n]);
            self.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn prefix_is_read_before_inner() {
        let (local, mut remote) = tokio::io::duplex(64);
        let mut stream = PrefixedStream::new(Bytes::from_static(b"GET / "), local);

        remote.write_all(b"HTTP/1.1\r\n").await.unwrap();
        drop(remote);

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"GET / HTTP/1.1\r\n");
        assert_eq!(stream.pending(), 0);
    }

    #[tokio::test]
    async fn small_reads_drain_prefix_gradually() {
        let (local, _remote) = tokio::io::duplex(64);
        let mut stream = PrefixedStream::new(Bytes::from_static(b"abcdef"), local);

        let mut buf = [0u8; 4];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"abcd");
        assert_eq!(stream.pending(), 2);
    }

    #[tokio::test]
    async fn writes_go_to_inner() {
        let (local, mut remote) = tokio::io::duplex(64);
        let mut stream = PrefixedStream::new(Bytes::new(), local);
        stream.write_all(b"pong").await.unwrap();

        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }
}
