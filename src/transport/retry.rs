//! Retry of transient I/O failures underneath the codec.
//!
//! `Framed` ends its stream after the first error it sees, so an interrupted
//! read has to be retried here, before the codec ever observes it.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::warn;

use crate::error::is_transient_kind;
use crate::utils::metrics::Metrics;

/// Upper bound on back-to-back retries of one transiently failing operation
pub const MAX_TRANSIENT_RETRIES: u32 = 3;

/// Stream wrapper that retries `Interrupted` and `WouldBlock` failures.
///
/// `Interrupted` is retried immediately. `WouldBlock` schedules a wake-up and
/// yields. After [`MAX_TRANSIENT_RETRIES`] consecutive failures the error is
/// passed through unchanged.
#[derive(Debug)]
pub struct RetryIo<T> {
    inner: T,
    consecutive: u32,
    metrics: Option<Arc<Metrics>>,
}

impl<T> RetryIo<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            consecutive: 0,
            metrics: None,
        }
    }

    /// Count every retry into `metrics`
    pub fn set_metrics(&mut self, metrics: Arc<Metrics>) {
        self.metrics = Some(metrics);
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn retry<R>(
        &mut self,
        cx: &mut Context<'_>,
        mut op: impl FnMut(Pin<&mut T>, &mut Context<'_>) -> Poll<io::Result<R>>,
    ) -> Poll<io::Result<R>>
    where
        T: Unpin,
    {
        loop {
            match op(Pin::new(&mut self.inner), cx) {
                Poll::Ready(Err(e))
                    if is_transient_kind(e.kind()) && self.consecutive < MAX_TRANSIENT_RETRIES =>
                {
                    self.consecutive += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.transient_retry();
                    }
                    warn!(error = %e, attempt = self.consecutive, "Transient I/O failure, retrying");

                    if e.kind() == io::ErrorKind::WouldBlock {
                        cx.waker().wake_by_ref();
                        return Poll::Pending;
                    }
                }
                Poll::Ready(result) => {
                    self.consecutive = 0;
                    return Poll::Ready(result);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for RetryIo<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().retry(cx, |io, cx| io.poll_read(cx, buf))
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for RetryIo<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().retry(cx, |io, cx| io.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().retry(cx, |io, cx| io.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().retry(cx, |io, cx| io.poll_shutdown(cx))
    }
}
