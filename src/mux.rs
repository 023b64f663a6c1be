//! Multiplexer: turns tagged output messages into result frames.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

use crate::dispatch::Tagged;
use crate::error::{InvokerError, Result};
use crate::protocol::ResultFrame;

/// Build the result frame for one tagged output message.
pub fn to_result_frame((result_index, message): Tagged) -> Result<ResultFrame> {
    message.into_result_frame(result_index).ok_or_else(|| {
        InvokerError::Internal(format!(
            "Output message for result index {} carries no content type",
            result_index
        ))
    })
}

/// Map a merged stream of tagged outputs to result frames, preserving arrival order.
pub fn multiplex<S>(tagged: S) -> BoxStream<'static, Result<ResultFrame>>
where
    S: Stream<Item = Result<Tagged>> + Send + 'static,
{
    tagged
        .map(|item| item.and_then(to_result_frame))
        .boxed()
}
