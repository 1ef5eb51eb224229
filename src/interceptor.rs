use crate::codec::{Codec, CodecAdapter};
use crate::error::{CodecError, InterceptError};
use crate::event::ResponseEvent;
use crate::headers;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use std::collections::VecDeque;
use std::fmt;

/// Where an [`Interceptor`] is in its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorState {
    /// Waiting for the response head.
    Init,
    /// Head captured, buffering the body until a decision can be made.
    Deciding,
    /// Committed to compression; head already forwarded.
    StreamingCompressed,
    /// Committed to forwarding the response untouched.
    StreamingPassthrough,
    /// The terminal chunk has been forwarded.
    Done,
}

/// Response head captured while deciding.
struct Head {
    status: StatusCode,
    headers: HeaderMap,
}

impl Head {
    fn into_event(self) -> ResponseEvent {
        ResponseEvent::Start {
            status: self.status,
            headers: self.headers,
        }
    }
}

/// Compression state machine for a single response.
///
/// Consumes the application's [`ResponseEvent`]s in order and pushes the
/// events the transport should see into an output queue. The head is held
/// back until enough of the body has been seen to decide:
///
/// - a body that completes in one go is compressed in a single shot and gets
///   an exact `Content-Length`;
/// - a body that keeps streaming is committed to compression once the
///   buffered prefix reaches the minimum size, or on its first chunk when the
///   response asks for every chunk to be flushed, and is sent without a length;
/// - a body that ends below the minimum size is forwarded untouched.
///
/// Owns its [`CodecAdapter`] exclusively. The adapter is released as soon as
/// the response no longer needs it: on a passthrough decision, after the
/// final flush, on [`abort`](Self::abort) or when the interceptor is dropped.
pub struct Interceptor {
    codec: Codec,
    adapter: Option<CodecAdapter>,
    minimum_size: usize,
    state: InterceptorState,
    head: Option<Head>,
    buffer: BytesMut,
    always_flush: bool,
}

impl Interceptor {
    /// Creates an interceptor that compresses with `adapter` once the body
    /// reaches `minimum_size` bytes.
    pub fn new(adapter: CodecAdapter, minimum_size: usize) -> Self {
        Self {
            codec: adapter.codec(),
            adapter: Some(adapter),
            minimum_size,
            state: InterceptorState::Init,
            head: None,
            buffer: BytesMut::new(),
            always_flush: false,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> InterceptorState {
        self.state
    }

    /// Returns the codec this interceptor compresses with.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Returns whether the codec adapter is still held.
    pub fn holds_adapter(&self) -> bool {
        self.adapter.is_some()
    }

    /// Returns the number of body bytes buffered while deciding.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Processes one event from the application.
    ///
    /// Events to forward are appended to `out` in order. On error the
    /// interceptor moves to [`InterceptorState::Done`] and releases its
    /// adapter; nothing derived from the failing event is emitted.
    pub fn handle(
        &mut self,
        event: ResponseEvent,
        out: &mut VecDeque<ResponseEvent>,
    ) -> Result<(), InterceptError> {
        let result = match (self.state, event) {
            (InterceptorState::Init, ResponseEvent::Start { status, headers }) => {
                self.on_start(status, headers, out);
                Ok(())
            }
            (InterceptorState::Deciding, ResponseEvent::BodyChunk { data, more_data }) => {
                self.on_deciding_chunk(data, more_data, out)
            }
            (
                InterceptorState::StreamingCompressed,
                ResponseEvent::BodyChunk { data, more_data },
            ) => self.on_compressed_chunk(data, more_data, out),
            (InterceptorState::StreamingPassthrough, event @ ResponseEvent::BodyChunk { .. }) => {
                if event.is_final_chunk() {
                    self.state = InterceptorState::Done;
                }
                out.push_back(event);
                Ok(())
            }
            (state, event) => Err(InterceptError::UnexpectedEvent {
                state,
                event: event.kind(),
            }),
        };

        if let Err(err) = &result {
            tracing::warn!(codec = %self.codec, error = %err, "aborting response compression");
            self.release();
        }
        result
    }

    /// Stops processing and releases the codec adapter.
    ///
    /// Returns the captured head if it was never forwarded, so the caller can
    /// still answer with the application's original status and headers.
    /// Buffered body bytes and unflushed compressed output are discarded.
    pub fn abort(&mut self) -> Option<ResponseEvent> {
        let head = self.head.take().map(Head::into_event);
        self.release();
        head
    }

    fn release(&mut self) {
        self.adapter = None;
        self.head = None;
        self.buffer = BytesMut::new();
        self.state = InterceptorState::Done;
    }

    fn on_start(&mut self, status: StatusCode, headers: HeaderMap, out: &mut VecDeque<ResponseEvent>) {
        if headers::opts_out(status, &headers) {
            tracing::debug!(%status, "response opts out of compression, passing through");
            // Nothing left to compress with
            self.adapter = None;
            self.state = InterceptorState::StreamingPassthrough;
            out.push_back(ResponseEvent::Start { status, headers });
            return;
        }

        self.always_flush = headers::wants_flush(&headers);
        self.head = Some(Head { status, headers });
        self.state = InterceptorState::Deciding;
    }

    fn on_deciding_chunk(
        &mut self,
        data: Bytes,
        more_data: bool,
        out: &mut VecDeque<ResponseEvent>,
    ) -> Result<(), InterceptError> {
        self.buffer.extend_from_slice(&data);
        let size = self.buffer.len();

        if !more_data {
            if size < self.minimum_size {
                tracing::debug!(
                    size,
                    minimum_size = self.minimum_size,
                    "body below minimum size, passing through"
                );
                self.adapter = None;
                self.state = InterceptorState::StreamingPassthrough;
                self.forward_head(None, out)?;
                out.push_back(ResponseEvent::BodyChunk {
                    data: self.take_buffer(),
                    more_data: false,
                });
                self.state = InterceptorState::Done;
                return Ok(());
            }

            let body = self.take_buffer();
            let adapter = self.adapter_mut()?;
            let mut compressed = BytesMut::new();
            compressed.extend_from_slice(&adapter.compress(&body)?);
            compressed.extend_from_slice(&adapter.flush()?);
            let compressed = compressed.freeze();
            self.adapter = None;

            tracing::debug!(
                codec = %self.codec,
                size,
                compressed = compressed.len(),
                "compressed complete body"
            );
            self.forward_head(Some(Some(compressed.len())), out)?;
            out.push_back(ResponseEvent::BodyChunk {
                data: compressed,
                more_data: false,
            });
            self.state = InterceptorState::Done;
            return Ok(());
        }

        // Flushed streams must reach the client without waiting for the window
        if size < self.minimum_size && !self.always_flush {
            tracing::trace!(size, "buffering body until minimum size");
            return Ok(());
        }

        let body = self.take_buffer();
        let mut compressed = BytesMut::new();
        compressed.extend_from_slice(&self.adapter_mut()?.compress(&body)?);
        if self.always_flush {
            compressed.extend_from_slice(&self.adapter_mut()?.sync_flush()?);
        }

        tracing::debug!(codec = %self.codec, size, "committed to streaming compression");
        self.forward_head(Some(None), out)?;
        out.push_back(ResponseEvent::BodyChunk {
            data: compressed.freeze(),
            more_data: true,
        });
        self.state = InterceptorState::StreamingCompressed;
        Ok(())
    }

    fn on_compressed_chunk(
        &mut self,
        data: Bytes,
        more_data: bool,
        out: &mut VecDeque<ResponseEvent>,
    ) -> Result<(), InterceptError> {
        let always_flush = self.always_flush;
        let adapter = self.adapter_mut()?;
        let mut compressed = BytesMut::new();
        compressed.extend_from_slice(&adapter.compress(&data)?);

        if !more_data {
            compressed.extend_from_slice(&adapter.flush()?);
            self.adapter = None;
            self.state = InterceptorState::Done;
        } else if always_flush {
            compressed.extend_from_slice(&adapter.sync_flush()?);
        }

        tracing::trace!(
            input = data.len(),
            output = compressed.len(),
            more_data,
            "compressed chunk"
        );
        out.push_back(ResponseEvent::BodyChunk {
            data: compressed.freeze(),
            more_data,
        });
        Ok(())
    }

    /// Forwards the captured head.
    ///
    /// `compressed` is `None` for an untouched head, `Some(length)` for a
    /// compressed one with an optional exact length.
    fn forward_head(
        &mut self,
        compressed: Option<Option<usize>>,
        out: &mut VecDeque<ResponseEvent>,
    ) -> Result<(), InterceptError> {
        let Some(mut head) = self.head.take() else {
            return Err(InterceptError::UnexpectedEvent {
                state: self.state,
                event: "body chunk",
            });
        };
        if let Some(content_length) = compressed {
            headers::mark_compressed(&mut head.headers, self.codec, content_length);
        }
        out.push_back(head.into_event());
        Ok(())
    }

    fn adapter_mut(&mut self) -> Result<&mut CodecAdapter, InterceptError> {
        self.adapter
            .as_mut()
            .ok_or(InterceptError::Codec(CodecError::Finished(self.codec)))
    }

    fn take_buffer(&mut self) -> Bytes {
        std::mem::take(&mut self.buffer).freeze()
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("codec", &self.codec)
            .field("state", &self.state)
            .field("minimum_size", &self.minimum_size)
            .field("buffered", &self.buffer.len())
            .field("always_flush", &self.always_flush)
            .finish()
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        if matches!(
            self.state,
            InterceptorState::Deciding | InterceptorState::StreamingCompressed
        ) {
            tracing::warn!(
                codec = %self.codec,
                state = ?self.state,
                "response dropped before completion, discarding compressor"
            );
        }
    }
}
