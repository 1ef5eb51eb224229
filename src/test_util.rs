use crate::codec::Codec;
use crate::event::ResponseEvent;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body::{Body, Frame};
use std::collections::VecDeque;
use std::fmt;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Header list for a bare `Start` event.
pub(crate) const NO_HEADERS: [(&str, &str); 0] = [];

/// Codecs compiled into the current build.
pub(crate) fn available_codecs() -> Vec<Codec> {
    Codec::ALL.into_iter().filter(Codec::is_available).collect()
}

/// Decodes `data` with an implementation independent from the encoders.
pub(crate) fn decode(codec: Codec, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    match codec {
        Codec::Gzip => {
            flate2::read::GzDecoder::new(data)
                .read_to_end(&mut out)
                .expect("valid gzip stream");
        }
        Codec::Deflate => {
            flate2::read::DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .expect("valid deflate stream");
        }
        Codec::Brotli => {
            brotli_decompressor::Decompressor::new(data, 4096)
                .read_to_end(&mut out)
                .expect("valid brotli stream");
        }
        Codec::Zstd => {
            out = zstd_decoder::decode_all(data).expect("valid zstd stream");
        }
    }
    out
}

/// Builds a `Start` event from static header pairs.
pub(crate) fn start<I>(headers: I) -> ResponseEvent
where
    I: IntoIterator<Item = (&'static str, &'static str)>,
{
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(name, value.parse().expect("valid header value"));
    }
    ResponseEvent::Start {
        status: StatusCode::OK,
        headers: map,
    }
}

/// Builds a `BodyChunk` event.
pub(crate) fn chunk(data: &'static [u8], more_data: bool) -> ResponseEvent {
    ResponseEvent::BodyChunk {
        data: Bytes::from_static(data),
        more_data,
    }
}

/// A body that yields predefined frames.
///
/// It never reports the end of stream early, so the last data frame is
/// always followed by an empty final chunk.
pub(crate) struct TestBody {
    frames: VecDeque<Result<Frame<Bytes>, TestError>>,
}

impl TestBody {
    pub(crate) fn new(frames: Vec<Result<Frame<Bytes>, TestError>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    pub(crate) fn data(chunks: &[&'static str]) -> Self {
        Self::new(
            chunks
                .iter()
                .map(|chunk| Ok(Frame::data(Bytes::from_static(chunk.as_bytes()))))
                .collect(),
        )
    }
}

impl Body for TestBody {
    type Data = Bytes;
    type Error = TestError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.frames.pop_front())
    }
}

#[derive(Debug, PartialEq)]
pub(crate) struct TestError;

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("upstream exploded")
    }
}

impl std::error::Error for TestError {}
