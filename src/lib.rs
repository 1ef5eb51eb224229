//! HTTP response compression middleware for Tower.
//!
//! This crate provides a Tower layer that compresses HTTP response bodies
//! with Zstd, Brotli, Gzip or Deflate, negotiated against the client's
//! `Accept-Encoding` header. The server's preference order decides; quality
//! values sent by the client are ignored.
//!
//! # Example
//!
//! ```ignore
//! use http_compression_interceptor::{CompressionConfig, CompressionLayer};
//! use tower::ServiceBuilder;
//!
//! let config: CompressionConfig = toml::from_str(r#"
//!     minimum_size = 512
//!     preference = ["br", "gzip"]
//! "#)?;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::with_config(&config)?)
//!     .service(my_service);
//! ```
//!
//! # Deciding
//!
//! The response head is held back while the body is buffered, up to the
//! minimum size (default: 860 bytes):
//! - A body that ends below the minimum size is sent untouched.
//! - A body that ends at or above it is compressed in one shot and gets an
//!   exact `Content-Length`.
//! - A body still streaming when the buffer reaches the minimum size is
//!   compressed as it arrives and sent without `Content-Length`.
//! - A response that asks to be flushed on every chunk (see below) is
//!   committed on its first chunk, whatever its size.
//!
//! # Compression Rules
//!
//! The middleware will **not** compress responses when:
//! - No registered codec is listed in `Accept-Encoding`
//! - The request path matches one of the excluded path patterns
//! - The status is `1xx`, `204 No Content` or `304 Not Modified`
//! - `Content-Encoding` header is already set
//! - `Content-Range` header is present (range responses)
//! - `Content-Type` starts with `image/` (except `image/svg+xml`)
//! - `Content-Type` starts with `application/grpc` (except `application/grpc-web`)
//!
//! The middleware will **always flush** after each chunk when:
//! - `X-Accel-Buffering: no` header is present
//! - `Content-Type` is `text/event-stream`
//! - `Content-Type` starts with `application/grpc-web`
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` header is set to the codec used
//! - `Content-Length` header is replaced or removed
//! - `Accept-Ranges` header is removed
//! - `Vary` header includes `Accept-Encoding`
//!
//! The [`Interceptor`] state machine does not depend on Tower and can be
//! driven directly with [`ResponseEvent`]s.

#![deny(missing_docs)]

mod body;
mod codec;
mod config;
mod dispatch;
mod error;
mod event;
mod future;
mod headers;
mod interceptor;
mod layer;
mod negotiate;
mod registry;
mod service;

#[cfg(test)]
mod test_util;

pub use body::{CompressionBody, InterceptedBody};
pub use codec::{Codec, CodecAdapter};
pub use config::{CodecLevels, CompressionConfig, DEFAULT_MIN_SIZE};
pub use dispatch::Dispatcher;
pub use error::{BoxError, CodecError, ConfigError, InterceptError};
pub use event::ResponseEvent;
pub use future::ResponseFuture;
pub use interceptor::{Interceptor, InterceptorState};
pub use layer::CompressionLayer;
pub use negotiate::{AcceptEncoding, negotiate};
pub use registry::Registry;
pub use service::CompressionService;
