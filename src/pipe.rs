//! Synchronous in-process byte pipe.
//!
//! [`pipe`] returns a connected [`PipeWriter`] / [`PipeReader`] pair.  A
//! write does not complete until the reader has taken the chunk off the
//! pipe, so a slow consumer throttles the producer and at most one chunk
//! is ever in flight.
//!
//! Closing the writer ends the stream cleanly.  Dropping it without
//! closing makes the reader yield an `UnexpectedEof` error instead, so a
//! consumer can tell an abandoned upload from a finished one.

use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

use crate::errors::StorageError;

/// One chunk plus the acknowledgement the reader fires on receipt.
struct Chunk {
    data: Bytes,
    ack: oneshot::Sender<()>,
}

/// Create a connected writer/reader pair.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(1);
    let closed = Arc::new(AtomicBool::new(false));
    (
        PipeWriter {
            tx: Some(tx),
            closed: Arc::clone(&closed),
        },
        PipeReader {
            rx,
            closed,
            done: false,
        },
    )
}

/// Producer end of the pipe.
pub struct PipeWriter {
    tx: Option<mpsc::Sender<Chunk>>,
    closed: Arc<AtomicBool>,
}

impl PipeWriter {
    /// Hand `data` to the reader, waiting until it has been taken.
    ///
    /// Returns [`StorageError::ClosedPipe`] after [`close`](Self::close)
    /// and [`StorageError::BrokenPipe`] once the reader is gone.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, StorageError> {
        let tx = self.tx.as_ref().ok_or(StorageError::ClosedPipe)?;
        if data.is_empty() {
            return Ok(0);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(Chunk {
            data: Bytes::copy_from_slice(data),
            ack: ack_tx,
        })
        .await
        .map_err(|_| StorageError::BrokenPipe)?;
        // The ack is dropped unanswered if the reader goes away with the
        // chunk still queued.
        ack_rx.await.map_err(|_| StorageError::BrokenPipe)?;
        Ok(data.len())
    }

    /// Signal end-of-stream.  Returns `false` if already closed.
    pub fn close(&mut self) -> bool {
        match self.tx.take() {
            Some(_) => {
                self.closed.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

/// Consumer end of the pipe, a stream of the chunks written.
pub struct PipeReader {
    rx: mpsc::Receiver<Chunk>,
    closed: Arc<AtomicBool>,
    done: bool,
}

impl Stream for PipeReader {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => {
                let _ = chunk.ack.send(());
                Poll::Ready(Some(Ok(chunk.data)))
            }
            Poll::Ready(None) => {
                self.done = true;
                if self.closed.load(Ordering::Acquire) {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "upload writer dropped before close",
                    ))))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
