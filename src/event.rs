use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// One step of a response as seen by the [`Interceptor`](crate::Interceptor).
///
/// A well-formed response is exactly one `Start` followed by one or more
/// `BodyChunk`s, the last of which has `more_data == false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    /// Status line and headers.
    Start {
        /// Response status.
        status: StatusCode,
        /// Response headers, in order.
        headers: HeaderMap,
    },
    /// A piece of the response body.
    BodyChunk {
        /// Body bytes, possibly empty.
        data: Bytes,
        /// Whether more chunks follow.
        more_data: bool,
    },
}

impl ResponseEvent {
    /// Returns a short name for the event kind, used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseEvent::Start { .. } => "start",
            ResponseEvent::BodyChunk { .. } => "body chunk",
        }
    }

    /// Returns whether this is the terminal body chunk.
    pub fn is_final_chunk(&self) -> bool {
        matches!(
            self,
            ResponseEvent::BodyChunk {
                more_data: false,
                ..
            }
        )
    }
}
