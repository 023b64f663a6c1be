//! Dedicated writer task for outgoing frames.
//!
//! The connection task hands encoded frames to a writer task over an mpsc
//! channel; the writer batches whatever is ready into one vectored write.
//!
//! ```text
//! Pipeline ─► WriterHandle ─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► socket
//! ```
//!
//! When every handle is dropped the writer flushes, shuts the write half
//! down and exits, so the peer sees end-of-stream after the final frame.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::MsgPackCodec;
use crate::error::{InvokerError, Result};
use crate::protocol::{kind, Header, OutputSignal, HEADER_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header.
    pub header: [u8; HEADER_SIZE],
    /// Body bytes (empty for END).
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create a frame of `kind` around an encoded body.
    #[inline]
    pub fn new(kind: u8, payload: Bytes) -> Self {
        Self {
            header: Header::new(kind, payload.len() as u32).encode(),
            payload,
        }
    }

    /// Create a frame with an empty body.
    #[inline]
    pub fn empty(kind: u8) -> Self {
        Self::new(kind, Bytes::new())
    }

    /// Encode an outgoing signal.
    pub fn encode(signal: &OutputSignal) -> Result<Self> {
        match signal {
            OutputSignal::Result(frame) => Ok(Self::new(
                kind::RESULT,
                Bytes::from(MsgPackCodec::encode(frame)?),
            )),
            OutputSignal::Error(status) => Ok(Self::new(
                kind::ERROR,
                Bytes::from(MsgPackCodec::encode(status)?),
            )),
            OutputSignal::End => Ok(Self::empty(kind::END)),
        }
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame, waiting while the channel is full.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| InvokerError::ConnectionClosed)
    }

    /// Encode and queue an outgoing signal.
    pub async fn send_signal(&self, signal: &OutputSignal) -> Result<()> {
        self.send(OutboundFrame::encode(signal)?).await
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The returned `JoinHandle` resolves once all handles are dropped and the
/// queued frames are written, or on the first I/O error.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        tracing::trace!(frames = batch.len(), "Writing batch");
        write_batch(&mut writer, &batch).await?;
    }

    writer.shutdown().await?;
    Ok(())
}

fn write_zero() -> InvokerError {
    InvokerError::Io(std::io::Error::new(
        std::io::ErrorKind::WriteZero,
        "write_vectored returned 0",
    ))
}

/// Write a batch of frames with vectored I/O, resuming after partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(write_zero());
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
        let header_end = offset + HEADER_SIZE;
        if skip_bytes < header_end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.header[start..]));
        }
        offset = header_end;

        if !frame.payload.is_empty() {
            let payload_end = offset + frame.payload.len();
            if skip_bytes < payload_end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&frame.payload[start..]));
            }
            offset = payload_end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_output, FrameBuffer, ResultFrame};
    use crate::status::{Code, Status};
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    fn result(index: u32, payload: &'static str) -> OutputSignal {
        OutputSignal::Result(ResultFrame {
            result_index: index,
            content_type: "text/plain".into(),
            payload: Bytes::from_static(payload.as_bytes()),
            headers: Default::default(),
        })
    }

    #[test]
    fn test_end_frame_is_header_only() {
        let frame = OutboundFrame::encode(&OutputSignal::End).unwrap();
        assert!(frame.payload.is_empty());
        assert_eq!(frame.size(), HEADER_SIZE);
        assert_eq!(frame.header[0], kind::END);
    }

    #[test]
    fn test_header_carries_body_length() {
        let frame = OutboundFrame::encode(&result(0, "abc")).unwrap();
        let header = Header::decode(&frame.header).unwrap();
        assert_eq!(header.kind, kind::RESULT);
        assert_eq!(header.payload_length as usize, frame.payload.len());
    }

    #[test]
    fn test_build_remaining_slices() {
        let batch = vec![OutboundFrame::new(kind::RESULT, Bytes::from_static(b"hello"))];

        assert_eq!(build_remaining_slices(&batch, 0).len(), 2);

        let partial = build_remaining_slices(&batch, 3);
        assert_eq!(partial[0].len(), HEADER_SIZE - 3);
        assert_eq!(partial[1].len(), 5);

        let payload_only = build_remaining_slices(&batch, HEADER_SIZE + 1);
        assert_eq!(payload_only.len(), 1);
        assert_eq!(payload_only[0].len(), 4);
    }

    #[tokio::test]
    async fn test_write_batch() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5)
            .map(|_| OutboundFrame::new(kind::RESULT, Bytes::from_static(b"abc")))
            .collect();

        write_batch(&mut buf, &batch).await.unwrap();
        assert_eq!(buf.into_inner().len(), 5 * (HEADER_SIZE + 3));
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order_then_eof() {
        let (local, mut remote) = duplex(4096);
        let (handle, task) = spawn_writer_task(local, WriterConfig::default());

        handle.send_signal(&result(0, "a")).await.unwrap();
        handle.send_signal(&result(1, "b")).await.unwrap();
        handle
            .send_signal(&OutputSignal::Error(Status::new(Code::Unknown, "boom")))
            .await
            .unwrap();
        drop(handle);
        task.await.unwrap().unwrap();

        let mut bytes = Vec::new();
        remote.read_to_end(&mut bytes).await.unwrap();

        let frames = FrameBuffer::new().push(&bytes).unwrap();
        let signals: Vec<_> = frames.iter().map(|f| decode_output(f).unwrap()).collect();
        assert_eq!(signals.len(), 3);
        assert_eq!(signals[0], result(0, "a"));
        assert_eq!(signals[1], result(1, "b"));
        assert!(matches!(&signals[2], OutputSignal::Error(s) if s.code == Code::Unknown));
    }

    #[tokio::test]
    async fn test_send_after_writer_exit_is_connection_closed() {
        let (tx, rx) = mpsc::channel::<OutboundFrame>(1);
        drop(rx);
        let handle = WriterHandle { tx };

        let err = handle.send(OutboundFrame::empty(kind::END)).await.unwrap_err();
        assert!(matches!(err, InvokerError::ConnectionClosed));
    }
}
