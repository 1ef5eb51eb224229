use crate::codec::Codec;
use http::HeaderMap;
use http::header;

/// Content codings a client advertised in `Accept-Encoding`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptEncoding {
    tokens: Vec<String>,
}

impl AcceptEncoding {
    /// Parses a comma-separated header value such as `"gzip, br;q=0.8"`.
    ///
    /// Tokens are trimmed and lowercased; parameters are discarded.
    pub fn parse(header: &str) -> Self {
        let mut accepted = Self::default();
        accepted.extend_from(header);
        accepted
    }

    /// Collects every `Accept-Encoding` line of a request.
    ///
    /// A value that is not visible ASCII makes the whole header malformed,
    /// which is treated the same as an empty header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut accepted = Self::default();
        for value in headers.get_all(header::ACCEPT_ENCODING) {
            let Ok(value) = value.to_str() else {
                tracing::debug!("malformed accept-encoding header, not compressing");
                return Self::default();
            };
            accepted.extend_from(value);
        }
        accepted
    }

    /// Returns whether the client listed `token`.
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// Returns whether no token was listed.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn extend_from(&mut self, header: &str) {
        for part in header.split(',') {
            let token = part.split(';').next().unwrap_or("").trim();
            if token.is_empty() {
                continue;
            }

            let mut token = token.to_ascii_lowercase();
            // RFC 9110 §8.4.1.3: x-gzip is an alias for gzip
            if token == "x-gzip" {
                token = "gzip".to_owned();
            }
            if !self.contains(&token) {
                self.tokens.push(token);
            }
        }
    }
}

/// Picks the first codec of `preference` that the client accepts.
///
/// Only the server's order matters; the order in which the client listed
/// its tokens has no influence.
pub fn negotiate<I>(accepted: &AcceptEncoding, preference: I) -> Option<Codec>
where
    I: IntoIterator<Item = Codec>,
{
    preference
        .into_iter()
        .find(|codec| accepted.contains(codec.content_encoding()))
}
