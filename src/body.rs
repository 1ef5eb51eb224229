use crate::error::{BoxError, InterceptError};
use crate::event::ResponseEvent;
use crate::interceptor::Interceptor;
use bytes::{Buf, Bytes};
use http::{HeaderMap, StatusCode};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

pin_project! {
    /// A response body that may be compressed.
    ///
    /// This type either runs the inner body through an [`Interceptor`] or
    /// passes it through unchanged.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Body driven through an interceptor.
        Intercepted {
            state: InterceptedBody<B>,
        },
        /// Passthrough body without compression.
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

/// Inner body, interceptor and the events it has produced but that were
/// not yet handed to the transport.
pub struct InterceptedBody<B> {
    inner: Pin<Box<B>>,
    interceptor: Interceptor,
    pending: VecDeque<ResponseEvent>,
    trailers: Option<HeaderMap>,
    error: Option<BoxError>,
    inner_done: bool,
}

/// Why feeding the interceptor stopped.
pub(crate) enum FeedError {
    /// The wrapped body failed.
    Upstream(BoxError),
    /// The interceptor rejected an event or its codec failed.
    Intercept(InterceptError),
}

impl<B> InterceptedBody<B> {
    pub(crate) fn new(
        inner: Pin<Box<B>>,
        interceptor: Interceptor,
        pending: VecDeque<ResponseEvent>,
    ) -> Self {
        Self {
            inner,
            interceptor,
            pending,
            trailers: None,
            error: None,
            inner_done: false,
        }
    }

    /// Returns the interceptor driving this body.
    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Pops the response head if the interceptor has released it.
    pub(crate) fn take_head(&mut self) -> Option<(StatusCode, HeaderMap)> {
        if !self.has_head() {
            return None;
        }
        match self.pending.pop_front() {
            Some(ResponseEvent::Start { status, headers }) => Some((status, headers)),
            _ => None,
        }
    }

    /// Returns whether the head is ready to be sent.
    pub(crate) fn has_head(&self) -> bool {
        matches!(self.pending.front(), Some(ResponseEvent::Start { .. }))
    }

    /// Returns whether nothing more will be read from the inner body.
    pub(crate) fn is_inner_done(&self) -> bool {
        self.inner_done
    }

    /// Records an upstream failure and releases the codec.
    ///
    /// Returns the original head if it was still held back.
    pub(crate) fn fail_upstream(&mut self, err: BoxError) -> Option<ResponseEvent> {
        self.pending.clear();
        self.trailers = None;
        self.inner_done = true;
        self.error = Some(err);
        self.interceptor.abort()
    }

    /// Drops everything after an interceptor failure.
    pub(crate) fn fail_internal(&mut self) {
        self.pending.clear();
        self.trailers = None;
        self.inner_done = true;
        self.interceptor.abort();
    }

    /// Puts the head back in front of the queue.
    pub(crate) fn restore_head(&mut self, head: ResponseEvent) {
        self.pending.push_front(head);
    }
}

impl<B> InterceptedBody<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    /// Reads one frame from the inner body and feeds it to the interceptor.
    pub(crate) fn poll_feed(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), FeedError>> {
        let event = match ready!(self.inner.as_mut().poll_frame(cx)) {
            Some(Ok(frame)) => match frame.into_data() {
                Ok(mut data) => {
                    let data = data.copy_to_bytes(data.remaining());
                    let more_data = !self.inner.is_end_stream();
                    ResponseEvent::BodyChunk { data, more_data }
                }
                Err(frame) => match frame.into_trailers() {
                    // Trailers end the data; hold them until the codec is flushed
                    Ok(trailers) => {
                        self.trailers = Some(trailers);
                        ResponseEvent::BodyChunk {
                            data: Bytes::new(),
                            more_data: false,
                        }
                    }
                    // Unknown frame kind
                    Err(_) => return Poll::Ready(Ok(())),
                },
            },
            None => ResponseEvent::BodyChunk {
                data: Bytes::new(),
                more_data: false,
            },
            Some(Err(e)) => return Poll::Ready(Err(FeedError::Upstream(e.into()))),
        };

        if event.is_final_chunk() {
            self.inner_done = true;
        }

        Poll::Ready(
            self.interceptor
                .handle(event, &mut self.pending)
                .map_err(FeedError::Intercept),
        )
    }

    /// Polls for the next frame to hand to the transport.
    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        loop {
            if let Some(err) = self.error.take() {
                return Poll::Ready(Some(Err(err)));
            }

            while let Some(event) = self.pending.pop_front() {
                match event {
                    ResponseEvent::BodyChunk { data, .. } if !data.is_empty() => {
                        return Poll::Ready(Some(Ok(Frame::data(data))));
                    }
                    ResponseEvent::BodyChunk { .. } => {}
                    ResponseEvent::Start { .. } => {
                        // The head already went out with the response
                        self.fail_internal();
                        let err = InterceptError::UnexpectedEvent {
                            state: self.interceptor.state(),
                            event: "start",
                        };
                        return Poll::Ready(Some(Err(err.into())));
                    }
                }
            }

            if self.inner_done {
                return Poll::Ready(self.trailers.take().map(|t| Ok(Frame::trailers(t))));
            }

            match ready!(self.poll_feed(cx)) {
                Ok(()) => {}
                Err(FeedError::Upstream(err)) => {
                    self.fail_upstream(err);
                }
                Err(FeedError::Intercept(err)) => {
                    self.fail_internal();
                    return Poll::Ready(Some(Err(err.into())));
                }
            }
        }
    }
}

impl<B> CompressionBody<B> {
    /// Creates a passthrough body without compression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    pub(crate) fn intercepted(state: InterceptedBody<B>) -> Self {
        Self::Intercepted { state }
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => {
                // Pass through frames, converting data to Bytes
                match ready!(inner.poll_frame(cx)) {
                    None => Poll::Ready(None),
                    Some(Ok(frame)) => Poll::Ready(Some(Ok(
                        frame.map_data(|mut data| data.copy_to_bytes(data.remaining()))
                    ))),
                    Some(Err(e)) => Poll::Ready(Some(Err(e.into()))),
                }
            }
            CompressionBodyProj::Intercepted { state } => state.poll_next(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Intercepted { state } => {
                state.inner_done
                    && state.pending.is_empty()
                    && state.trailers.is_none()
                    && state.error.is_none()
            }
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            CompressionBody::Intercepted { state } if state.inner_done && state.error.is_none() => {
                let len = state
                    .pending
                    .iter()
                    .map(|event| match event {
                        ResponseEvent::BodyChunk { data, .. } => data.len() as u64,
                        ResponseEvent::Start { .. } => 0,
                    })
                    .sum();
                SizeHint::with_exact(len)
            }
            // Compressed size is unknown until the inner body ends
            CompressionBody::Intercepted { .. } => SizeHint::default(),
        }
    }
}
