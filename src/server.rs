//! Server builder and connection loop.
//!
//! The [`ServerBuilder`] configures which function connections invoke and
//! how many invocations may run at once. The [`Server`] runs one
//! [`Pipeline`] per connection:
//! 1. A reader task decodes inbound frames into an mpsc channel
//! 2. The pipeline consumes the channel; the reader's `AbortHandle` is its upstream
//! 3. Each Result frame goes to the writer task
//! 4. `END` on completion or `ERROR` on failure closes the exchange
//!
//! The caller ends its input with an `END` frame or by half-closing.
//!
//! # Example
//!
//! ```no_run
//! use streaming_invoker::handler::{FunctionRegistry, MapHandle};
//! use streaming_invoker::Server;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = FunctionRegistry::new();
//!     registry.register("upper", MapHandle::new("text/plain", |s: String| s.to_uppercase()));
//!
//!     let server = Server::builder("upper")
//!         .registry(registry)
//!         .max_concurrent_invocations(64)
//!         .build();
//!
//!     server.serve(TcpListener::bind("127.0.0.1:7000").await?).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{InvokerError, Result};
use crate::handler::{FunctionRegistry, Registry};
use crate::pipeline::Pipeline;
use crate::protocol::{decode_input, kind, FrameBuffer, InputSignal, OutputSignal, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::writer::{spawn_writer_task, WriterConfig};

/// Default maximum concurrent invocations.
pub const DEFAULT_MAX_CONCURRENT_INVOCATIONS: usize = 256;

/// Default capacity of the inbound frame channel.
pub const DEFAULT_INBOUND_CAPACITY: usize = 64;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Function every connection invokes.
    pub function_name: String,
    /// Connections served at the same time; further accepts wait.
    pub max_concurrent_invocations: usize,
    /// Inbound frames buffered ahead of the pipeline.
    pub inbound_capacity: usize,
    /// Largest accepted frame body.
    pub max_payload_size: u32,
    /// Outgoing writer settings.
    pub writer: WriterConfig,
}

impl ServerConfig {
    /// Defaults for `function_name`.
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            max_concurrent_invocations: DEFAULT_MAX_CONCURRENT_INVOCATIONS,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder {
    registry: Arc<dyn Registry>,
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder for a server invoking `function_name`.
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            registry: Arc::new(FunctionRegistry::new()),
            config: ServerConfig::new(function_name),
        }
    }

    /// Set the registry handles are resolved from.
    ///
    /// Default: an empty [`FunctionRegistry`]
    pub fn registry(mut self, registry: impl Registry + 'static) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Set the maximum number of concurrent invocations.
    ///
    /// Default: 256
    pub fn max_concurrent_invocations(mut self, limit: usize) -> Self {
        self.config.max_concurrent_invocations = limit;
        self
    }

    /// Set the inbound frame channel capacity.
    ///
    /// Default: 64
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.config.inbound_capacity = capacity;
        self
    }

    /// Set the maximum frame body size.
    ///
    /// Default: 64 MiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Build the server.
    pub fn build(self) -> Server {
        Server {
            semaphore: Arc::new(Semaphore::new(self.config.max_concurrent_invocations)),
            registry: self.registry,
            config: Arc::new(self.config),
        }
    }
}

/// A configured invoker server.
#[derive(Clone)]
pub struct Server {
    registry: Arc<dyn Registry>,
    config: Arc<ServerConfig>,
    semaphore: Arc<Semaphore>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder(function_name: impl Into<String>) -> ServerBuilder {
        ServerBuilder::new(function_name)
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept connections forever, one pipeline per connection.
    ///
    /// Returns only when accepting fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            function = %self.config.function_name,
            addr = ?listener.local_addr().ok(),
            "Serving"
        );

        loop {
            let (stream, peer) = listener.accept().await?;
            if let Err(e) = stream.set_nodelay(true) {
                tracing::warn!(%peer, "Failed to set TCP_NODELAY: {}", e);
            }

            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| InvokerError::ConnectionClosed)?;

            let server = self.clone();
            tokio::spawn(async move {
                // Permit is held until the connection is done
                let _permit = permit;
                tracing::debug!(%peer, "Connection accepted");
                if let Err(e) = server.serve_connection(stream).await {
                    tracing::error!(%peer, "Connection error: {}", e);
                }
            });
        }
    }

    /// Run one invocation over `io` until the outgoing stream is finished.
    pub async fn serve_connection<IO>(&self, io: IO) -> Result<()>
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(io);

        let (tx, rx) = mpsc::channel(self.config.inbound_capacity.max(1));
        let reader_task = tokio::spawn(read_loop(reader, tx, self.config.max_payload_size));
        let (writer, writer_task) = spawn_writer_task(write_half, self.config.writer.clone());

        let mut pipeline = Pipeline::new(
            self.registry.clone(),
            self.config.function_name.clone(),
            ReceiverStream::new(rx),
            reader_task.abort_handle(),
        );

        let mut results = 0usize;
        let mut terminal = OutputSignal::End;
        while let Some(item) = pipeline.next().await {
            match item {
                Ok(frame) => {
                    results += 1;
                    writer.send_signal(&OutputSignal::Result(frame)).await?;
                }
                Err(status) => terminal = OutputSignal::Error(status),
            }
        }
        writer.send_signal(&terminal).await?;
        tracing::debug!(
            function = %self.config.function_name,
            results,
            state = ?pipeline.state(),
            "Invocation finished"
        );

        drop(pipeline);
        drop(writer);
        reader_task.abort();

        writer_task
            .await
            .map_err(|e| InvokerError::Internal(format!("writer task failed: {}", e)))?
    }
}

/// Read frames until end of input, forwarding decoded signals.
///
/// Stops after the first error it forwards, on an `END` frame, on EOF, or
/// when the pipeline stops listening.
async fn read_loop<R>(mut reader: R, tx: mpsc::Sender<Result<InputSignal>>, max_payload_size: u32)
where
    R: AsyncRead + Unpin,
{
    let mut frame_buffer = FrameBuffer::with_max_payload(max_payload_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                if frame_buffer.has_partial_frame() {
                    let _ = tx.send(Err(InvokerError::ConnectionClosed)).await;
                }
                return;
            }
            Ok(n) => n,
            Err(e) => {
                let _ = tx.send(Err(InvokerError::Io(e))).await;
                return;
            }
        };

        let frames = match frame_buffer.push(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        for frame in frames {
            if frame.header.kind == kind::END {
                tracing::trace!("End of input");
                return;
            }
            let signal = decode_input(&frame);
            let failed = signal.is_err();
            if tx.send(signal).await.is_err() || failed {
                return;
            }
        }
    }
}
