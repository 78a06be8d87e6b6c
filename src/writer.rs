//! Dedicated writer task for outbound frames.
//!
//! Callers never touch the socket. They encode their message and queue it on
//! an mpsc channel; a single task drains the channel, stamps sequence
//! numbers, and writes whole frames, so frames from concurrent callers never
//! interleave.
//!
//! # Architecture
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<OutboundMessage> ─► Writer Task ─► Socket
//! Caller N ─┘
//! ```
//!
//! Ready messages are batched into a single vectored write. Enqueue order is
//! the order on the wire.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::error::{MemstateError, Result};
use crate::message::Message;
use crate::protocol::{Header, SequenceCounter, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// An encoded message waiting for the writer task.
#[derive(Debug)]
pub struct OutboundMessage {
    /// Message variant name, for tracing.
    pub kind: &'static str,
    /// Encoded message.
    pub payload: Bytes,
}

/// A frame ready to be written: header stamped with its sequence number.
#[derive(Debug)]
struct OutboundFrame {
    header: [u8; HEADER_SIZE],
    payload: Bytes,
}

impl OutboundFrame {
    fn stamp(message: OutboundMessage, sequence: &SequenceCounter) -> Self {
        let header = Header::new(sequence.next(), message.payload.len() as u32);
        tracing::trace!(
            sequence = header.sequence,
            kind = message.kind,
            len = header.payload_length,
            "writing frame"
        );
        Self {
            header: header.encode(),
            payload: message.payload,
        }
    }

    #[inline]
    fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the message queue.
    pub channel_capacity: usize,
    /// Largest encoded message accepted for sending.
    pub max_payload_size: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

/// Handle for queueing messages on the writer task.
///
/// This is cheaply cloneable and can be shared across callers.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundMessage>,
    /// Messages queued but not yet written.
    pending: Arc<AtomicUsize>,
    max_payload_size: u32,
}

impl WriterHandle {
    /// Encode `message` with `C` and queue it.
    ///
    /// Encoding happens on the caller's task so a bad message fails only its
    /// own request.
    pub async fn send_message<C: Codec>(&self, message: &Message) -> Result<()> {
        let payload = C::encode(message)?;
        self.send(OutboundMessage {
            kind: message.kind(),
            payload: Bytes::from(payload),
        })
        .await
    }

    /// Queue an already encoded message.
    ///
    /// Waits only while the channel is full.
    pub async fn send(&self, message: OutboundMessage) -> Result<()> {
        self.check_size(&message)?;
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(message).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            MemstateError::ConnectionClosed
        })
    }

    fn check_size(&self, message: &OutboundMessage) -> Result<()> {
        if message.payload.len() > self.max_payload_size as usize {
            return Err(MemstateError::Protocol(format!(
                "{} of {} bytes exceeds maximum {}",
                message.kind,
                message.payload.len(),
                self.max_payload_size
            )));
        }
        Ok(())
    }

    /// Messages queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Spawn the writer task and return a handle for queueing messages.
///
/// The task exits when every handle is dropped, when `cancel` fires, or on
/// the first write error. A write error also cancels `cancel` so the rest of
/// the connection shuts down. The write half is shut down on exit.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    cancel: CancellationToken,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
        max_payload_size: config.max_payload_size,
    };

    let task = tokio::spawn(writer_loop(rx, writer, pending, cancel));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundMessage>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let sequence = SequenceCounter::new();

    let result = loop {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            next = rx.recv() => match next {
                Some(message) => message,
                None => break Ok(()),
            },
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(OutboundFrame::stamp(first, &sequence));

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(message) => batch.push(OutboundFrame::stamp(message, &sequence)),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        if let Err(e) = write_batch(&mut writer, &batch).await {
            break Err(e);
        }
        pending.fetch_sub(batch_size, Ordering::Release);
    };

    match &result {
        Ok(()) => tracing::debug!(frames = sequence.current(), "writer task stopped"),
        Err(e) => {
            tracing::error!("writer task failed: {}", e);
            cancel.cancel();
        }
    }

    rx.close();
    let _ = writer.shutdown().await;
    result
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(MemstateError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data after the first `skip_bytes`.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        for part in [&frame.header[..], &frame.payload[..]] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(offset)..]));
            }
            offset = end;
        }
    }

    slices
}
