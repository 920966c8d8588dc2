//! Dedicated writer task for outgoing request frames.
//!
//! The exchange sends synchronously, so it cannot await a socket write.
//! Instead, encoded frames go through a bounded mpsc channel to a task that
//! owns the write half of the stream.
//!
//! # Architecture
//!
//! ```text
//! RequestExchange ─► WriterHandle::send (try_send) ─► mpsc ─► Writer Task ─► Stream
//! ```
//!
//! The task drains whatever is queued into one `write_vectored` call and
//! flushes once per batch.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ObexError, Result};
use crate::exchange::Transport;

/// Default number of frames the writer queue holds.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 16;

/// Handle for queueing frames to the writer task.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    /// `None` once closed.
    tx: Option<mpsc::Sender<Bytes>>,
    /// Frames queued but not yet written.
    pending: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Queue a frame without waiting.
    ///
    /// Fails with [`ObexError::Transport`] when the queue is full and with
    /// [`ObexError::ConnectionClosed`] when the writer is gone.
    pub fn try_send(&self, frame: Bytes) -> Result<usize> {
        let tx = self.tx.as_ref().ok_or(ObexError::ConnectionClosed)?;
        let len = frame.len();

        self.pending.fetch_add(1, Ordering::AcqRel);
        tx.try_send(frame).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    ObexError::Transport("writer queue is full".into())
                }
                mpsc::error::TrySendError::Closed(_) => ObexError::ConnectionClosed,
            }
        })?;
        Ok(len)
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Stop accepting frames. The task exits after writing what is queued.
    pub fn close(&mut self) {
        self.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

impl Transport for WriterHandle {
    fn send(&mut self, bytes: Bytes) -> Result<usize> {
        self.try_send(bytes)
    }
}

/// Spawn the writer task and return a handle for queueing frames.
///
/// The returned `JoinHandle` resolves when every handle is closed or
/// dropped, or with the first write error.
pub fn spawn_writer_task<W>(
    writer: W,
    channel_capacity: usize,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx: Some(tx),
        pending: pending.clone(),
    };
    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let Some(first) = rx.recv().await else {
            tracing::debug!("writer channel closed");
            writer.shutdown().await.ok();
            return Ok(());
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::error!(error = %e, "writer task failed");
            return Err(e);
        }
        tracing::trace!(frames = batch_size, "batch written");

        pending.fetch_sub(batch_size, Ordering::Release);
    }
}

/// Write a batch of frames with scatter/gather I/O, then flush.
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(Bytes::len).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(ObexError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices for the part of `batch` not yet written.
fn remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut start = 0;

    for frame in batch {
        let end = start + frame.len();
        if skip_bytes < end && !frame.is_empty() {
            let offset = skip_bytes.saturating_sub(start);
            slices.push(IoSlice::new(&frame[offset..]));
        }
        start = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_frames_reach_stream_in_order() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);

        handle.try_send(Bytes::from_static(&[0x80, 0x00, 0x03])).unwrap();
        handle.try_send(Bytes::from_static(&[0x81, 0x00, 0x03])).unwrap();

        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x80, 0x00, 0x03, 0x81, 0x00, 0x03]);
    }

    #[tokio::test]
    async fn test_transport_send_reports_length() {
        let (client, _server) = duplex(4096);
        let (mut handle, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);

        let written = Transport::send(&mut handle, Bytes::from_static(b"abcdef")).unwrap();
        assert_eq!(written, 6);
    }

    #[tokio::test]
    async fn test_pending_count_drops_after_write() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);

        handle.try_send(Bytes::from_static(&[1, 2, 3])).unwrap();
        let mut buf = [0u8; 3];
        server.read_exact(&mut buf).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_is_transport_error() {
        let (tx, _rx) = mpsc::channel::<Bytes>(1);
        let handle = WriterHandle {
            tx: Some(tx),
            pending: Arc::new(AtomicUsize::new(0)),
        };

        handle.try_send(Bytes::from_static(&[1])).unwrap();
        let err = handle.try_send(Bytes::from_static(&[2])).unwrap_err();
        assert!(matches!(err, ObexError::Transport(_)));
        assert_eq!(handle.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_handle_refuses_frames() {
        let (client, _server) = duplex(64);
        let (mut handle, task) = spawn_writer_task(client, 4);

        handle.close();
        assert!(handle.is_closed());
        assert!(matches!(
            handle.try_send(Bytes::from_static(&[1])),
            Err(ObexError::ConnectionClosed)
        ));

        assert!(task.await.unwrap().is_ok());
    }

    #[test]
    fn test_remaining_slices_skips_written_bytes() {
        let batch = vec![
            Bytes::from_static(&[1, 2, 3]),
            Bytes::from_static(&[4, 5]),
        ];

        assert_eq!(remaining_slices(&batch, 0).len(), 2);

        let slices = remaining_slices(&batch, 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(&*slices[0], &[3]);

        let slices = remaining_slices(&batch, 3);
        assert_eq!(slices.len(), 1);
        assert_eq!(&*slices[0], &[4, 5]);
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5).map(|_| Bytes::from_static(b"abc")).collect();

        write_batch(&mut buf, &batch).await.unwrap();
        assert_eq!(buf.into_inner().len(), 15);
    }
}
