//! Input and output ports.
//!
//! Every frame has an input port and two output ports (output and error).
//! A port carries two streams side by side: structured values over a
//! bounded channel, and raw bytes. Builtins mostly speak values; external
//! commands only speak bytes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, Lines, ReadBuf};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use super::exception::{Cause, ExecResult, Exception};
use super::pipe::{PipeReader, PipeWriter};
use super::value::Value;

/// Where values are read from.
#[derive(Clone, Default)]
pub enum ValueIn {
    #[default]
    Closed,
    Chan(Arc<Mutex<mpsc::Receiver<Value>>>),
}

/// Where bytes are read from.
#[derive(Clone, Default)]
pub enum ByteIn {
    #[default]
    Closed,
    Stdin,
    Pipe(Arc<Mutex<PipeReader>>),
    File(Arc<Mutex<tokio::fs::File>>),
}

/// Where values go.
#[derive(Clone, Default)]
pub enum ValueOut {
    #[default]
    Discard,
    Chan(mpsc::Sender<Value>),
    /// Written to the byte side as `▶ repr` lines, for a terminal.
    Print,
}

/// Where bytes go.
#[derive(Clone, Default)]
pub enum ByteOut {
    #[default]
    Discard,
    Stdout,
    Stderr,
    Pipe(Arc<PipeWriter>),
    File(Arc<Mutex<tokio::fs::File>>),
}

#[derive(Clone, Default)]
pub struct InPort {
    pub values: ValueIn,
    pub bytes: ByteIn,
}

#[derive(Clone, Default)]
pub struct OutPort {
    pub values: ValueOut,
    pub bytes: ByteOut,
}

/// The three ports of a frame.
#[derive(Clone, Default)]
pub struct Ports {
    pub input: InPort,
    pub output: OutPort,
    pub error: OutPort,
}

impl Ports {
    /// Nothing in, everything discarded.
    pub fn null() -> Self {
        Self::default()
    }

    /// Process stdin/stdout/stderr; values are printed to stdout.
    pub fn stdio() -> Self {
        Self {
            input: InPort {
                values: ValueIn::Closed,
                bytes: ByteIn::Stdin,
            },
            output: OutPort {
                values: ValueOut::Print,
                bytes: ByteOut::Stdout,
            },
            error: OutPort {
                values: ValueOut::Print,
                bytes: ByteOut::Stderr,
            },
        }
    }
}

impl ValueIn {
    /// Refuse further values; blocked and future senders see a closed channel.
    pub async fn close(&self) {
        if let ValueIn::Chan(rx) = self {
            rx.lock().await.close();
        }
    }
}

impl OutPort {
    /// Send one value, or drop it if nobody is reading any more.
    pub async fn put(&self, value: Value, cancel: &CancellationToken) -> ExecResult<()> {
        match &self.values {
            ValueOut::Discard => Ok(()),
            ValueOut::Chan(tx) => {
                tokio::select! {
                    // a gone receiver is not an error: the reader chose to stop
                    _ = tx.send(value) => Ok(()),
                    _ = cancel.cancelled() => Err(Exception::new(Cause::Canceled)),
                }
            }
            ValueOut::Print => {
                let line = format!("▶ {}\n", value.repr());
                self.write(line.as_bytes(), cancel).await
            }
        }
    }

    /// Write raw bytes.
    pub async fn write(&self, data: &[u8], cancel: &CancellationToken) -> ExecResult<()> {
        let io = async {
            match &self.bytes {
                ByteOut::Discard => Ok(()),
                ByteOut::Stdout => {
                    let mut out = tokio::io::stdout();
                    out.write_all(data).await?;
                    out.flush().await
                }
                ByteOut::Stderr => {
                    let mut err = tokio::io::stderr();
                    err.write_all(data).await?;
                    err.flush().await
                }
                ByteOut::Pipe(w) => match w.write_all(data).await {
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                },
                ByteOut::File(f) => {
                    // tokio files write in the background; the next form may reopen the path
                    let mut f = f.lock().await;
                    f.write_all(data).await?;
                    f.flush().await
                }
            }
        };
        tokio::select! {
            r = io => r.map_err(|e| Exception::new(Cause::io(e))),
            _ = cancel.cancelled() => Err(Exception::new(Cause::Canceled)),
        }
    }
}

/// An `AsyncRead` that keeps a shared reader locked while it is in use.
struct Locked<T>(OwnedMutexGuard<T>);

impl<T: AsyncRead + Unpin> AsyncRead for Locked<T> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.0).poll_read(cx, buf)
    }
}

pub(crate) type BoxRead = Box<dyn AsyncRead + Send + Unpin>;

impl ByteIn {
    /// Exclusive reader over the byte input, or `None` when closed.
    pub(crate) async fn reader(&self) -> Option<BoxRead> {
        match self {
            ByteIn::Closed => None,
            ByteIn::Stdin => Some(Box::new(tokio::io::stdin())),
            ByteIn::Pipe(p) => Some(Box::new(Locked(p.clone().lock_owned().await))),
            ByteIn::File(f) => Some(Box::new(Locked(f.clone().lock_owned().await))),
        }
    }

    /// Read everything left.
    pub async fn read_all(&self, cancel: &CancellationToken) -> ExecResult<Vec<u8>> {
        let Some(mut r) = self.reader().await else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        tokio::select! {
            res = r.read_to_end(&mut out) => res.map_err(|e| Exception::new(Cause::io(e)))?,
            _ = cancel.cancelled() => return Err(Exception::new(Cause::Canceled)),
        };
        Ok(out)
    }
}

/// Reads a frame's inputs: values from the value side and lines from the
/// byte side, whichever arrives first, until both are exhausted.
pub struct Inputs {
    values: Option<OwnedMutexGuard<mpsc::Receiver<Value>>>,
    lines: Option<Lines<BufReader<BoxRead>>>,
    cancel: CancellationToken,
}

impl Inputs {
    pub async fn open(input: &InPort, cancel: &CancellationToken) -> Self {
        let values = match &input.values {
            ValueIn::Chan(rx) => Some(rx.clone().lock_owned().await),
            ValueIn::Closed => None,
        };
        let lines = input.bytes.reader().await.map(|r| BufReader::new(r).lines());
        Self {
            values,
            lines,
            cancel: cancel.clone(),
        }
    }

    pub async fn next(&mut self) -> ExecResult<Option<Value>> {
        loop {
            let Inputs { values, lines, cancel } = self;
            let (has_values, has_lines) = (values.is_some(), lines.is_some());
            if !has_values && !has_lines {
                return Ok(None);
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Exception::new(Cause::Canceled)),
                v = async { values.as_mut()?.recv().await }, if has_values => match v {
                    Some(v) => return Ok(Some(v)),
                    None => *values = None,
                },
                l = async { match lines.as_mut() {
                    Some(l) => l.next_line().await,
                    None => Ok(None),
                } }, if has_lines => match l {
                    Ok(Some(line)) => return Ok(Some(Value::Str(line))),
                    Ok(None) => *lines = None,
                    Err(e) => return Err(Exception::new(Cause::io(e))),
                },
            }
        }
    }

    pub async fn collect(mut self) -> ExecResult<Vec<Value>> {
        let mut out = Vec::new();
        while let Some(v) = self.next().await? {
            out.push(v);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::pipe::pipe;

    #[tokio::test]
    async fn inputs_merge_values_and_lines() {
        let (tx, rx) = mpsc::channel(4);
        let (w, r) = pipe(64);
        let input = InPort {
            values: ValueIn::Chan(Arc::new(Mutex::new(rx))),
            bytes: ByteIn::Pipe(Arc::new(Mutex::new(r))),
        };
        tx.send(Value::from("v")).await.unwrap();
        drop(tx);
        w.write_all(b"l1\nl2\r\n").await.unwrap();
        drop(w);

        let cancel = CancellationToken::new();
        let mut got = Inputs::open(&input, &cancel).await.collect().await.unwrap();
        got.sort_by_key(|v| v.to_str());
        assert_eq!(got, vec![Value::from("l1"), Value::from("l2"), Value::from("v")]);
    }

    #[tokio::test]
    async fn put_to_dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let out = OutPort {
            values: ValueOut::Chan(tx),
            bytes: ByteOut::Discard,
        };
        out.put(Value::Nil, &CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn put_observes_cancellation() {
        let (tx, _rx) = mpsc::channel(1);
        tx.send(Value::Nil).await.unwrap();
        let out = OutPort {
            values: ValueOut::Chan(tx),
            bytes: ByteOut::Discard,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = out.put(Value::Nil, &cancel).await.unwrap_err();
        assert!(err.is_canceled());
    }
}
