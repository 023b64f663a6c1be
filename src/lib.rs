//! # streaming-invoker
//!
//! Streaming protocol adapter for a function-invocation server.
//!
//! One invocation is one duplex stream of frames. The caller sends a Start
//! frame naming the content types it accepts for each output, then Data
//! frames tagged with an argument index. The invoker splits those into one
//! ordered stream per argument, calls the function handle once, and merges
//! the handle's output streams back into Result frames tagged with their
//! output index.
//!
//! ## Architecture
//!
//! ```text
//! frames ─► Pipeline ─► CancelSafe ─► Demultiplexer ─► dispatch ─► handle
//!                                                                   │
//! frames ◄─ Pipeline ◄──────────── multiplex ◄──────────────────────┘
//! ```
//!
//! - [`pipeline`] - the protocol state machine
//! - [`guard`] - suppresses cancellation of an input that already completed
//! - [`demux`] - splits Data frames into argument streams
//! - [`dispatch`] - call shapes and the [`Invocable`] handle trait
//! - [`mux`] - output messages to Result frames
//! - [`status`] - outward error taxonomy
//! - [`server`] - runs pipelines over TCP or any async byte stream
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use futures::{executor::block_on, stream, StreamExt};
//! use streaming_invoker::handler::{FunctionRegistry, MapHandle};
//! use streaming_invoker::protocol::{DataFrame, InputSignal, StartFrame};
//! use streaming_invoker::Pipeline;
//!
//! let mut registry = FunctionRegistry::new();
//! registry.register("double", MapHandle::new("text/plain", |n: i64| n * 2));
//!
//! let request = stream::iter(vec![
//!     Ok(InputSignal::from(StartFrame::new(["text/plain"]))),
//!     Ok(InputSignal::from(DataFrame::new(0, "text/plain", "21"))),
//! ]);
//!
//! let frames: Vec<_> = block_on(Pipeline::detached(Arc::new(registry), "double", request).collect());
//! assert_eq!(frames[0].as_ref().unwrap().payload(), b"42");
//! ```

pub mod codec;
pub mod demux;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod handler;
pub mod message;
pub mod mux;
pub mod pipeline;
pub mod protocol;
pub mod status;
pub mod writer;

mod server;

pub use dispatch::{Arguments, Invocable, OutputStream, Outputs, Shape};
pub use error::InvokerError;
pub use handler::{FnHandle, FunctionRegistry, MapHandle, Registry};
pub use message::Message;
pub use pipeline::{Pipeline, PipelineState};
pub use server::{
    Server, ServerBuilder, ServerConfig, DEFAULT_INBOUND_CAPACITY,
    DEFAULT_MAX_CONCURRENT_INVOCATIONS,
};
pub use status::{Code, Status};
