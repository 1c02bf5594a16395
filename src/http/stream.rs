use crate::trace::{ClientTrace, TraceContext};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Debug)]
struct ActiveRequest {
    trace: TraceContext,
    pending_write: bool,
    got_first_byte: bool,
}

/// The request currently using a connection. Re-armed for every request
/// sent over it.
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestSlot {
    inner: Arc<Mutex<Option<ActiveRequest>>>,
}

impl RequestSlot {
    fn lock(&self) -> MutexGuard<'_, Option<ActiveRequest>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn arm(&self, trace: TraceContext) {
        *self.lock() = Some(ActiveRequest {
            trace,
            pending_write: false,
            got_first_byte: false,
        });
    }

    fn on_write(&self) {
        if let Some(active) = self.lock().as_mut() {
            active.pending_write = true;
        }
    }

    fn on_flush(&self) {
        let trace = match self.lock().as_mut() {
            Some(active) if active.pending_write && !active.got_first_byte => {
                active.pending_write = false;
                active.trace.clone()
            }
            _ => return,
        };
        trace.wrote_request();
    }

    fn on_read(&self) {
        let trace = match self.lock().as_mut() {
            Some(active) if !active.got_first_byte => {
                active.got_first_byte = true;
                active.trace.clone()
            }
            _ => return,
        };
        trace.got_first_response_byte();
    }
}

/// Connection stream that reports request-written and first-byte events
/// of whichever request is armed in its slot.
///
/// Sits above TLS, so handshake traffic is not counted.
pub(crate) struct TracedStream<S> {
    inner: S,
    slot: RequestSlot,
}

impl<S> TracedStream<S> {
    pub(crate) fn new(inner: S, slot: RequestSlot) -> Self {
        Self { inner, slot }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TracedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let polled = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = polled {
            if buf.filled().len() > before {
                this.slot.on_read();
            }
        }
        polled
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TracedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = polled {
            if n > 0 {
                this.slot.on_write();
            }
        }
        polled
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(n)) = polled {
            if n > 0 {
                this.slot.on_write();
            }
        }
        polled
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_flush(cx);
        if let Poll::Ready(Ok(())) = polled {
            this.slot.on_flush();
        }
        polled
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::StatRecorder;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn flush_and_first_read_mark_the_armed_request() {
        let (client, mut server) = duplex(64);
        let slot = RequestSlot::default();
        let mut stream = TracedStream::new(client, slot.clone());

        let recorder = StatRecorder::new();
        slot.arm(crate::trace::with_http_stat(TraceContext::new(), &recorder));

        stream.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        stream.flush().await.unwrap();

        let mut request = [0u8; 18];
        server.read_exact(&mut request).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        server.write_all(b"HTTP/1.1 200 OK\r\n").await.unwrap();

        let mut response = [0u8; 17];
        stream.read_exact(&mut response).await.unwrap();

        let stat = recorder.snapshot();
        // no dial hooks fired, so the dial phases collapsed at write time
        assert_eq!(stat.dns_lookup(), std::time::Duration::ZERO);
        assert!(stat.server_processing() >= std::time::Duration::from_millis(2));
    }

    #[tokio::test]
    async fn unarmed_stream_is_transparent() {
        let (client, mut server) = duplex(64);
        let mut stream = TracedStream::new(client, RequestSlot::default());

        stream.write_all(b"ping").await.unwrap();
        stream.flush().await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }
}
