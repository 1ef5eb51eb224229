use crate::codec::Codec;
use http::StatusCode;
use http::header::{self, HeaderMap, HeaderValue};

/// Returns whether the response must be forwarded untouched.
///
/// Bodiless statuses, already-encoded bodies, range responses and content
/// types that are either precompressed (images) or framed per message (gRPC)
/// are skipped.
pub(crate) fn opts_out(status: StatusCode, headers: &HeaderMap) -> bool {
    is_bodiless_status(status)
        || has_content_encoding(headers)
        || has_content_range(headers)
        || is_uncompressible_content_type(headers)
}

/// Returns whether every chunk should be flushed to the client as it arrives.
pub(crate) fn wants_flush(headers: &HeaderMap) -> bool {
    headers
        .get("x-accel-buffering")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("no"))
        || is_streaming_content_type(headers)
}

/// Rewrites headers for a compressed body.
///
/// `content_length` is the exact compressed size when known; otherwise the
/// header is removed.
pub(crate) fn mark_compressed(headers: &mut HeaderMap, codec: Codec, content_length: Option<usize>) {
    headers.insert(
        header::CONTENT_ENCODING,
        HeaderValue::from_static(codec.content_encoding()),
    );

    match content_length {
        Some(len) => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }
        None => {
            headers.remove(header::CONTENT_LENGTH);
        }
    }

    // Byte ranges of the identity body no longer apply
    headers.remove(header::ACCEPT_RANGES);

    add_vary_accept_encoding(headers);
}

/// Checks if the status forbids a response body.
fn is_bodiless_status(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Checks if Content-Encoding header is already present.
fn has_content_encoding(headers: &HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_ENCODING)
}

/// Checks if Content-Range header is present (range response).
fn has_content_range(headers: &HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_RANGE)
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut HeaderMap) {
    let covered = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|vary| vary.to_str().ok())
        .flat_map(|vary| vary.split(','))
        .map(str::trim)
        .any(|v| v == "*" || v.eq_ignore_ascii_case("accept-encoding"));

    if !covered {
        headers.append(header::VARY, HeaderValue::from_static("accept-encoding"));
    }
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// Checks if the content type should not be compressed.
fn is_uncompressible_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = content_type(headers) else {
        return false;
    };

    // Skip all images except SVG
    if content_type.starts_with("image/") {
        return !content_type.starts_with("image/svg+xml");
    }

    // Skip gRPC except grpc-web
    if content_type.starts_with("application/grpc") {
        return !content_type.starts_with("application/grpc-web");
    }

    false
}

/// Checks if the content type is a long-lived stream.
fn is_streaming_content_type(headers: &HeaderMap) -> bool {
    content_type(headers).is_some_and(|ct| {
        ct.starts_with("text/event-stream") || ct.starts_with("application/grpc-web")
    })
}
