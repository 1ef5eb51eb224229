use crate::body::{CompressionBody, FeedError, InterceptedBody};
use crate::error::BoxError;
use crate::event::ResponseEvent;
use crate::interceptor::{Interceptor, InterceptorState};
use http::response::Parts;
use http::{HeaderMap, Response, StatusCode};
use http_body::Body;
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

pin_project! {
    /// Future for compression service responses.
    ///
    /// When an interceptor was installed, the response head is held back
    /// until the interceptor has seen enough of the body to decide whether
    /// to compress.
    pub struct ResponseFuture<F, B> {
        #[pin]
        inner: F,
        interceptor: Option<Interceptor>,
        deciding: Option<Deciding<B>>,
    }
}

/// Response whose head is held back while the body is buffered.
struct Deciding<B> {
    parts: Parts,
    body: InterceptedBody<B>,
}

impl<F, B> ResponseFuture<F, B> {
    pub(crate) fn new(inner: F, interceptor: Option<Interceptor>) -> Self {
        Self {
            inner,
            interceptor,
            deciding: None,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
    B::Error: Into<BoxError>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if this.deciding.is_none() {
            let response = match ready!(this.inner.poll(cx)) {
                Ok(response) => response,
                Err(e) => return Poll::Ready(Err(e)),
            };

            let Some(interceptor) = this.interceptor.take() else {
                return Poll::Ready(Ok(response.map(CompressionBody::passthrough)));
            };

            match start(response, interceptor) {
                Started::Passthrough(response) => return Poll::Ready(Ok(response)),
                Started::Deciding(deciding) => *this.deciding = Some(deciding),
            }
        }

        if let Some(deciding) = this.deciding.as_mut() {
            ready!(deciding.poll_decide(cx));
        }

        match this.deciding.take() {
            Some(deciding) => Poll::Ready(Ok(deciding.into_response())),
            None => Poll::Pending,
        }
    }
}

enum Started<B> {
    /// The response opted out; its body is forwarded as-is.
    Passthrough(Response<CompressionBody<B>>),
    /// The head is captured and the body must be read before deciding.
    Deciding(Deciding<B>),
}

/// Hands the response head to the interceptor.
fn start<B>(response: Response<B>, mut interceptor: Interceptor) -> Started<B> {
    let (mut parts, body) = response.into_parts();
    let mut pending = VecDeque::new();

    let event = ResponseEvent::Start {
        status: parts.status,
        headers: std::mem::take(&mut parts.headers),
    };
    let result = interceptor.handle(event, &mut pending);

    if result.is_ok() && interceptor.state() == InterceptorState::StreamingPassthrough {
        if let Some(ResponseEvent::Start { status, headers }) = pending.pop_front() {
            parts.status = status;
            parts.headers = headers;
        }
        return Started::Passthrough(Response::from_parts(
            parts,
            CompressionBody::passthrough(body),
        ));
    }

    let mut body = InterceptedBody::new(Box::pin(body), interceptor, pending);
    if result.is_err() {
        body.fail_internal();
    }
    Started::Deciding(Deciding { parts, body })
}

impl<B> Deciding<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    /// Reads the body until the head is released or the response failed.
    fn poll_decide(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        while !self.body.has_head() && !self.body.is_inner_done() {
            match ready!(self.body.poll_feed(cx)) {
                Ok(()) => {}
                Err(FeedError::Upstream(err)) => {
                    // Answer with the untouched head; the body reports the error
                    if let Some(head) = self.body.fail_upstream(err) {
                        self.body.restore_head(head);
                    }
                }
                Err(FeedError::Intercept(_)) => self.body.fail_internal(),
            }
        }
        Poll::Ready(())
    }

    fn into_response(mut self) -> Response<CompressionBody<B>> {
        match self.body.take_head() {
            Some((status, headers)) => {
                self.parts.status = status;
                self.parts.headers = headers;
            }
            None => {
                tracing::warn!("compression failed before the response head was sent");
                self.parts.status = StatusCode::INTERNAL_SERVER_ERROR;
                self.parts.headers = HeaderMap::new();
            }
        }
        Response::from_parts(self.parts, CompressionBody::intercepted(self.body))
    }
}
