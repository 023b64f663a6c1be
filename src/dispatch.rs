//! Invocation dispatcher: adapts argument groups to the call shape a handle
//! expects, invokes it once, and normalizes what it returns into positional
//! output streams.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::StreamExt;

use crate::demux::{ArgumentGroup, ArgumentStream};
use crate::error::Result;
use crate::message::Message;

/// One output of a handle, in element order.
pub type OutputStream = BoxStream<'static, Result<Message>>;

/// Positional arity shape, used for both arguments and results.
pub enum Shape<T> {
    /// No value at all.
    None,
    /// A single value.
    One(T),
    /// An ordered tuple of values (two or more for arguments).
    Tuple(Vec<T>),
}

impl<T> Shape<T> {
    /// Normalize a positional list: empty → `None`, one → `One`, more → `Tuple`.
    pub fn from_vec(mut items: Vec<T>) -> Self {
        match items.len() {
            0 => Shape::None,
            1 => match items.pop() {
                Some(item) => Shape::One(item),
                None => Shape::None,
            },
            _ => Shape::Tuple(items),
        }
    }

    /// Flatten back into positional order.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Shape::None => Vec::new(),
            Shape::One(item) => vec![item],
            Shape::Tuple(items) => items,
        }
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        match self {
            Shape::None => 0,
            Shape::One(_) => 1,
            Shape::Tuple(items) => items.len(),
        }
    }

    /// Whether there are no positions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for Shape<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::None => f.write_str("Shape::None"),
            Shape::One(_) => f.write_str("Shape::One"),
            Shape::Tuple(items) => write!(f, "Shape::Tuple({})", items.len()),
        }
    }
}

/// Arguments passed to a handle.
pub type Arguments = Shape<ArgumentStream>;

/// Outputs returned by a handle.
pub type Outputs = Shape<OutputStream>;

impl Outputs {
    /// A single output holding exactly one message.
    pub fn single(message: Message) -> Self {
        Shape::One(stream::once(async move { Ok(message) }).boxed())
    }
}

/// An invocable function, resolved once per invocation.
pub trait Invocable: Send + Sync {
    /// Number of argument streams the handle consumes.
    fn input_arity(&self) -> usize;

    /// Invoke with the normalized arguments.
    ///
    /// The handle owns conversion of argument messages into its domain types
    /// and of its results back into messages, reporting failures as
    /// [`InvokerError::InputConversion`](crate::InvokerError::InputConversion) /
    /// [`InvokerError::OutputConversion`](crate::InvokerError::OutputConversion).
    fn invoke(&self, args: Arguments) -> Result<Outputs>;
}

impl<T: Invocable + ?Sized> Invocable for Arc<T> {
    fn input_arity(&self) -> usize {
        (**self).input_arity()
    }

    fn invoke(&self, args: Arguments) -> Result<Outputs> {
        (**self).invoke(args)
    }
}

/// Output message tagged with the index of the stream that produced it.
pub type Tagged = (u32, Message);

/// Invoke `handle` once with the sorted argument groups, merging its outputs.
///
/// Outputs interleave as they become ready; each output's own order is kept.
pub fn dispatch(
    handle: &dyn Invocable,
    groups: Vec<ArgumentGroup>,
) -> Result<BoxStream<'static, Result<Tagged>>> {
    let args = Shape::from_vec(groups.into_iter().map(ArgumentGroup::into_stream).collect());
    tracing::trace!(?args, "Invoking handle");

    let outputs = handle.invoke(args)?.into_vec();
    tracing::trace!(outputs = outputs.len(), "Handle returned");

    let tagged = outputs.into_iter().enumerate().map(|(index, output)| {
        let index = index as u32;
        output
            .map(move |item| item.map(|message| (index, message)))
            .boxed()
    });

    Ok(stream::select_all(tagged).boxed())
}
