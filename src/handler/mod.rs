//! Handler module - function lookup and ready-made handles.
//!
//! Provides:
//! - [`Registry`] - resolves a function name to an [`Invocable`](crate::Invocable)
//! - [`FunctionRegistry`] - in-memory registry with output content-type negotiation
//! - [`FnHandle`], [`MapHandle`] - handles built from closures
//!
//! # Example
//!
//! ```
//! use streaming_invoker::handler::{FnHandle, FunctionRegistry, MapHandle};
//! use streaming_invoker::{Message, Outputs};
//!
//! let mut registry = FunctionRegistry::new();
//!
//! // Element-wise typed function
//! registry.register("double", MapHandle::new("text/plain", |n: i64| n * 2));
//!
//! // Raw handle over the argument shape
//! registry.register("hello", FnHandle::new(0, |_args| {
//!     Ok(Outputs::single(Message::with_content_type("hello", "text/plain")))
//! }));
//!
//! assert_eq!(registry.len(), 2);
//! ```

mod function;
mod registry;

pub use function::{FnHandle, MapHandle};
pub use registry::{FunctionRegistry, Registry};
