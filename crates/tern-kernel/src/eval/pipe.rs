//! In-memory byte pipe between pipeline stages.
//!
//! ```text
//!   PipeWriter ──▶ [ring buffer, bounded] ──▶ PipeReader
//!     full   → writer parks until the reader drains
//!     empty  → reader parks until data or writer drop
//!     writer dropped → reader drains then sees EOF
//!     reader dropped → writes fail with BrokenPipe
//! ```
//!
//! The buffer sits under a `std::sync::Mutex`; critical sections are only
//! deque operations and waker swaps, never an await. Closed flags are atomics
//! so both `Drop` impls stay synchronous.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, ReadBuf};

/// Capacity used when none is configured.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

struct Ring {
    data: VecDeque<u8>,
    capacity: usize,
    reader: Option<Waker>,
    writer: Option<Waker>,
}

struct Shared {
    ring: Mutex<Ring>,
    writer_gone: AtomicBool,
    reader_gone: AtomicBool,
}

impl Shared {
    fn ring(&self) -> std::sync::MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct PipeWriter {
    shared: Arc<Shared>,
}

pub struct PipeReader {
    shared: Arc<Shared>,
}

/// A connected writer/reader pair holding at most `capacity` bytes in flight.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        ring: Mutex::new(Ring {
            data: VecDeque::with_capacity(capacity.min(8 * 1024)),
            capacity: capacity.max(1),
            reader: None,
            writer: None,
        }),
        writer_gone: AtomicBool::new(false),
        reader_gone: AtomicBool::new(false),
    });
    (PipeWriter { shared: shared.clone() }, PipeReader { shared })
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

impl PipeWriter {
    fn poll_write_some(&self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let mut ring = self.shared.ring();
        // checked under the lock so a concurrent reader drop cannot slip between
        if self.shared.reader_gone.load(Ordering::Acquire) {
            return Poll::Ready(Err(broken_pipe()));
        }
        let room = ring.capacity.saturating_sub(ring.data.len());
        if room == 0 {
            ring.writer = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = room.min(buf.len());
        ring.data.extend(&buf[..n]);
        if let Some(w) = ring.reader.take() {
            w.wake();
        }
        Poll::Ready(Ok(n))
    }

    /// Write all of `data`, waiting for room as needed.
    ///
    /// Takes `&self` so a writer shared between forked frames can be used
    /// without exclusive access.
    pub async fn write_all(&self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let n = poll_fn(|cx| self.poll_write_some(cx, data)).await?;
            data = &data[n..];
        }
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.writer_gone.store(true, Ordering::Release);
        if let Ok(mut ring) = self.shared.ring.lock() {
            if let Some(w) = ring.reader.take() {
                w.wake();
            }
        }
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let mut ring = self.shared.ring();
        if ring.data.is_empty() {
            if self.shared.writer_gone.load(Ordering::Acquire) {
                return Poll::Ready(Ok(()));
            }
            ring.reader = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = buf.remaining().min(ring.data.len());
        let (front, back) = ring.data.as_slices();
        let from_front = n.min(front.len());
        buf.put_slice(&front[..from_front]);
        buf.put_slice(&back[..n - from_front]);
        ring.data.drain(..n);
        if let Some(w) = ring.writer.take() {
            w.wake();
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.reader_gone.store(true, Ordering::Release);
        if let Ok(mut ring) = self.shared.ring.lock() {
            if let Some(w) = ring.writer.take() {
                w.wake();
            }
        }
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PipeWriter")
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PipeReader")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn eof_after_writer_drop() {
        let (w, mut r) = pipe(16);
        w.write_all(b"abc").await.unwrap();
        drop(w);
        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn writer_waits_for_room() {
        let (w, mut r) = pipe(4);
        let writer = tokio::spawn(async move {
            w.write_all(b"0123456789").await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished(), "writer should be parked on a full pipe");
        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();
        writer.await.unwrap();
        assert_eq!(out, b"0123456789");
    }

    #[tokio::test]
    async fn reader_drop_breaks_pipe() {
        let (w, r) = pipe(4);
        drop(r);
        let err = w.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn wraparound_reads_in_order() {
        let (w, mut r) = pipe(5);
        let mut buf = [0u8; 3];
        w.write_all(b"abc").await.unwrap();
        r.read_exact(&mut buf).await.unwrap();
        w.write_all(b"defgh").await.unwrap();
        drop(w);
        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();
        assert_eq!(&buf, b"abc");
        assert_eq!(out, b"defgh");
    }
}
