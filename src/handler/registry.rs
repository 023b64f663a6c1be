//! Function registry resolving names to invocation handles.
//!
//! [`FunctionRegistry`] is the in-memory [`Registry`]. When the caller lists
//! accepted output content types, the resolved handle is wrapped so that
//! output `i` is checked against accepted type `i`:
//!
//! - a missing or empty entry accepts anything;
//! - `*/*` and `type/*` wildcards and comma-separated lists are honored;
//! - a message without a content type takes the first concrete accepted type;
//! - anything else fails with [`InvokerError::OutputConversion`].
//!
//! # Example
//!
//! ```
//! use streaming_invoker::handler::{FunctionRegistry, MapHandle, Registry};
//! use streaming_invoker::Invocable;
//!
//! let mut registry = FunctionRegistry::new();
//! registry.register("upper", MapHandle::new("text/plain", |s: String| s.to_uppercase()));
//!
//! let handle = registry.resolve("upper", &["text/*".to_string()]).unwrap();
//! assert_eq!(handle.input_arity(), 1);
//! assert!(registry.resolve("lower", &[]).is_none());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;

use crate::codec::{accepts, first_concrete};
use crate::dispatch::{Arguments, Invocable, OutputStream, Outputs, Shape};
use crate::error::{InvokerError, Result};
use crate::message::Message;

/// Resolves a function name to a handle for one invocation.
pub trait Registry: Send + Sync {
    /// Look up `name`, honoring the caller's accepted output content types.
    fn resolve(&self, name: &str, accepted: &[String]) -> Option<Arc<dyn Invocable>>;
}

impl<R: Registry + ?Sized> Registry for Arc<R> {
    fn resolve(&self, name: &str, accepted: &[String]) -> Option<Arc<dyn Invocable>> {
        (**self).resolve(name, accepted)
    }
}

/// Registry mapping function names to handles.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Invocable>>,
}

impl FunctionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle, replacing any previous one under the same name.
    pub fn register(&mut self, name: impl Into<String>, handle: impl Invocable + 'static) {
        let name = name.into();
        tracing::debug!(function = %name, arity = handle.input_arity(), "Registered function");
        self.functions.insert(name, Arc::new(handle));
    }

    /// Whether a function is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Registry for FunctionRegistry {
    fn resolve(&self, name: &str, accepted: &[String]) -> Option<Arc<dyn Invocable>> {
        let handle = self.functions.get(name)?.clone();
        if accepted.iter().all(|accept| accept.trim().is_empty()) {
            return Some(handle);
        }
        Some(Arc::new(Negotiated {
            inner: handle,
            accepted: accepted.to_vec(),
        }))
    }
}

/// Handle wrapper enforcing accepted output content types.
struct Negotiated {
    inner: Arc<dyn Invocable>,
    accepted: Vec<String>,
}

impl Invocable for Negotiated {
    fn input_arity(&self) -> usize {
        self.inner.input_arity()
    }

    fn invoke(&self, args: Arguments) -> Result<Outputs> {
        let outputs = self.inner.invoke(args)?.into_vec();
        let negotiated: Vec<OutputStream> = outputs
            .into_iter()
            .enumerate()
            .map(|(index, output)| {
                let accept = self.accepted.get(index).cloned().unwrap_or_default();
                output
                    .map(move |item| item.and_then(|message| negotiate(message, &accept)))
                    .boxed()
            })
            .collect();
        Ok(Shape::from_vec(negotiated))
    }
}

/// Check one output message against an accept entry.
fn negotiate(mut message: Message, accept: &str) -> Result<Message> {
    if accept.trim().is_empty() {
        return Ok(message);
    }

    match message.content_type().map(str::to_owned) {
        Some(content_type) if accepts(accept, &content_type) => Ok(message),
        Some(content_type) => Err(InvokerError::output_conversion(format!(
            "content type {} does not match accepted {}",
            content_type, accept
        ))),
        None => match first_concrete(accept) {
            Some(media) => {
                message.set_content_type(media.to_string());
                Ok(message)
            }
            None => Err(InvokerError::output_conversion(format!(
                "output has no content type and {} names none",
                accept
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnHandle;
    use futures::stream;

    fn constant(messages: Vec<Vec<Message>>) -> FnHandle {
        FnHandle::new(0, move |_args| {
            let outputs: Vec<OutputStream> = messages
                .clone()
                .into_iter()
                .map(|output| stream::iter(output.into_iter().map(Ok)).boxed())
                .collect();
            Ok(Shape::from_vec(outputs))
        })
    }

    async fn run(handle: &dyn Invocable) -> Vec<Vec<Result<Message>>> {
        let mut collected = Vec::new();
        for output in handle.invoke(Shape::None).unwrap().into_vec() {
            collected.push(output.collect().await);
        }
        collected
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = FunctionRegistry::new();
        assert!(registry.is_empty());

        registry.register("f", constant(vec![]));
        assert!(registry.contains("f"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["f"]);
        assert!(registry.resolve("g", &[]).is_none());
    }

    #[tokio::test]
    async fn test_no_accept_list_passes_through() {
        let mut registry = FunctionRegistry::new();
        registry.register("f", constant(vec![vec![Message::new("raw")]]));

        let handle = registry.resolve("f", &[]).unwrap();
        let outputs = run(&*handle).await;
        assert_eq!(outputs[0][0].as_ref().unwrap().content_type(), None);
    }

    #[tokio::test]
    async fn test_wildcard_and_list_match() {
        let mut registry = FunctionRegistry::new();
        registry.register(
            "f",
            constant(vec![
                vec![Message::with_content_type("1", "text/plain")],
                vec![Message::with_content_type("{}", "application/json")],
                vec![Message::with_content_type("x", "image/png")],
            ]),
        );

        let accepted = vec!["text/*".to_string(), "text/plain, application/json".to_string()];
        let handle = registry.resolve("f", &accepted).unwrap();
        let outputs = run(&*handle).await;

        assert!(outputs[0][0].is_ok());
        assert!(outputs[1][0].is_ok());
        // no accept entry for index 2
        assert!(outputs[2][0].is_ok());
    }

    #[tokio::test]
    async fn test_mismatch_is_output_conversion() {
        let mut registry = FunctionRegistry::new();
        registry.register(
            "f",
            constant(vec![vec![Message::with_content_type("1", "text/plain")]]),
        );

        let handle = registry.resolve("f", &["application/json".to_string()]).unwrap();
        let outputs = run(&*handle).await;
        assert!(matches!(
            outputs[0][0],
            Err(InvokerError::OutputConversion { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_content_type_takes_concrete_accept() {
        let mut registry = FunctionRegistry::new();
        registry.register(
            "f",
            constant(vec![vec![Message::new("a")], vec![Message::new("b")]]),
        );

        let accepted = vec!["*/*, application/json".to_string(), "text/*".to_string()];
        let handle = registry.resolve("f", &accepted).unwrap();
        let outputs = run(&*handle).await;

        assert_eq!(
            outputs[0][0].as_ref().unwrap().content_type(),
            Some("application/json")
        );
        assert!(matches!(
            outputs[1][0],
            Err(InvokerError::OutputConversion { .. })
        ));
    }
}
