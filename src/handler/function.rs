//! Ready-made invocation handles.
//!
//! - [`FnHandle`] wraps a closure over the raw [`Arguments`] shape.
//! - [`MapHandle`] converts each element of a single argument stream into `T`,
//!   applies a function and converts the result back, one output per input.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::ContentCodec;
use crate::dispatch::{Arguments, Invocable, Outputs, Shape};
use crate::error::{InvokerError, Result};

type InvokeFn = dyn Fn(Arguments) -> Result<Outputs> + Send + Sync;

/// Handle built from an arity and a closure.
///
/// # Example
///
/// ```
/// use streaming_invoker::handler::FnHandle;
/// use streaming_invoker::{Invocable, Message, Outputs};
///
/// let hello = FnHandle::new(0, |_args| {
///     Ok(Outputs::single(Message::with_content_type("hello", "text/plain")))
/// });
/// assert_eq!(hello.input_arity(), 0);
/// ```
pub struct FnHandle {
    arity: usize,
    f: Box<InvokeFn>,
}

impl FnHandle {
    /// Create a handle consuming `arity` argument streams.
    pub fn new<F>(arity: usize, f: F) -> Self
    where
        F: Fn(Arguments) -> Result<Outputs> + Send + Sync + 'static,
    {
        Self {
            arity,
            f: Box::new(f),
        }
    }
}

impl fmt::Debug for FnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandle").field("arity", &self.arity).finish()
    }
}

impl Invocable for FnHandle {
    fn input_arity(&self) -> usize {
        self.arity
    }

    fn invoke(&self, args: Arguments) -> Result<Outputs> {
        (self.f)(args)
    }
}

/// Element-wise typed handle with one argument and one output.
pub struct MapHandle<F, T, R> {
    content_type: String,
    f: Arc<F>,
    _phantom: PhantomData<fn(T) -> R>,
}

impl<F, T, R> MapHandle<F, T, R>
where
    F: Fn(T) -> R + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    /// Create a handle producing messages of `content_type`.
    pub fn new(content_type: impl Into<String>, f: F) -> Self {
        Self {
            content_type: content_type.into(),
            f: Arc::new(f),
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R> Invocable for MapHandle<F, T, R>
where
    F: Fn(T) -> R + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn input_arity(&self) -> usize {
        1
    }

    fn invoke(&self, args: Arguments) -> Result<Outputs> {
        let input = match args {
            Shape::One(input) => input,
            other => {
                return Err(InvokerError::Internal(format!(
                    "expected a single argument, got {:?}",
                    other
                )))
            }
        };

        let f = self.f.clone();
        let content_type = self.content_type.clone();
        let output = input
            .map(move |item| {
                let value: T = ContentCodec::decode(&item?)?;
                ContentCodec::encode(&f(value), &content_type)
            })
            .boxed();

        Ok(Shape::One(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use futures::stream;

    #[tokio::test]
    async fn test_fn_handle_passes_arguments() {
        let handle = FnHandle::new(2, |args| match args {
            Shape::Tuple(items) => {
                let count = items.len().to_string();
                Ok(Outputs::single(Message::with_content_type(count, "text/plain")))
            }
            other => Err(InvokerError::Internal(format!("{:?}", other))),
        });

        let args = Shape::Tuple(vec![stream::empty().boxed(), stream::empty().boxed()]);
        let mut outputs = handle.invoke(args).unwrap().into_vec();
        let message = outputs.remove(0).next().await.unwrap().unwrap();
        assert_eq!(message.payload(), b"2");
    }

    #[tokio::test]
    async fn test_map_handle_converts_each_element() {
        let handle = MapHandle::new("application/json", |n: i64| n * 10);
        let input = stream::iter(vec![
            Ok(Message::with_content_type("1", "text/plain")),
            Ok(Message::with_content_type("2", "application/json")),
        ])
        .boxed();

        let mut outputs = handle.invoke(Shape::One(input)).unwrap().into_vec();
        let results: Vec<_> = outputs.remove(0).map(|r| r.unwrap()).collect().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].payload(), b"10");
        assert_eq!(results[1].payload(), b"20");
        assert_eq!(results[1].content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_map_handle_reports_input_conversion() {
        let handle = MapHandle::new("text/plain", |n: i64| n);
        let input = stream::iter(vec![Ok(Message::with_content_type("abc", "text/plain"))]).boxed();

        let mut outputs = handle.invoke(Shape::One(input)).unwrap().into_vec();
        let first = outputs.remove(0).next().await.unwrap();
        assert!(matches!(first, Err(InvokerError::InputConversion { .. })));
    }

    #[test]
    fn test_map_handle_rejects_wrong_shape() {
        let handle = MapHandle::new("text/plain", |s: String| s);
        assert!(handle.invoke(Shape::None).is_err());
    }
}
