use crate::codec::Codec;
use crate::interceptor::InterceptorState;
use std::io;
use thiserror::Error;

/// Boxed error type yielded by [`CompressionBody`](crate::CompressionBody).
///
/// Errors from the wrapped body are boxed as-is, so they can be recovered
/// with [`downcast`](std::error::Error::downcast_ref).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a [`CodecAdapter`](crate::CodecAdapter).
#[derive(Debug, Error)]
pub enum CodecError {
    /// The codec was not compiled into this build.
    #[error("codec `{0}` is not available in this build")]
    Unavailable(Codec),

    /// The requested level is outside the codec's valid range.
    #[error("level {level} is out of range for `{codec}` (expected {min}..={max})")]
    InvalidLevel {
        /// Codec the level was requested for.
        codec: Codec,
        /// Rejected level.
        level: u32,
        /// Smallest accepted level.
        min: u32,
        /// Largest accepted level.
        max: u32,
    },

    /// `compress` or `flush` was called after the stream was finished.
    #[error("`{0}` encoder used after flush")]
    Finished(Codec),

    /// The underlying encoder failed.
    #[error("`{codec}` encoder failed")]
    Io {
        /// Codec whose encoder failed.
        codec: Codec,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Errors raised by the [`Interceptor`](crate::Interceptor) state machine.
///
/// These indicate a bug in the caller or in the codec, never bad input.
#[derive(Debug, Error)]
pub enum InterceptError {
    /// An event arrived that the current state cannot accept.
    #[error("unexpected {event} event in state {state:?}")]
    UnexpectedEvent {
        /// State the interceptor was in.
        state: InterceptorState,
        /// Kind of event received.
        event: &'static str,
    },

    /// The codec adapter failed or was misused.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors raised while building a [`Dispatcher`](crate::Dispatcher) from a
/// [`CompressionConfig`](crate::CompressionConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A codec appears more than once in the preference order.
    #[error("codec `{0}` is listed more than once in the preference order")]
    DuplicateCodec(Codec),

    /// A configured level is invalid.
    #[error(transparent)]
    Level(CodecError),

    /// An excluded path pattern does not compile.
    #[error("invalid excluded path pattern")]
    ExcludedPath(#[from] regex::Error),
}
