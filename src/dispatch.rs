use crate::codec::Codec;
use crate::config::{CompressionConfig, DEFAULT_MIN_SIZE};
use crate::error::ConfigError;
use crate::interceptor::Interceptor;
use crate::negotiate::{AcceptEncoding, negotiate};
use crate::registry::Registry;
use http::Request;
use regex::RegexSet;
use std::sync::Arc;

/// Per-request entry point of the compression layer.
///
/// Negotiates once per request and hands out a fresh [`Interceptor`] when
/// the response may be compressed. Cheap to clone; the registry is shared.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    minimum_size: usize,
    excluded_paths: Option<Arc<RegexSet>>,
}

impl Dispatcher {
    /// Builds a dispatcher from configuration, probing codec availability.
    pub fn new(config: &CompressionConfig) -> Result<Self, ConfigError> {
        let registry = Registry::from_config(config)?;

        let excluded_paths = if config.excluded_paths.is_empty() {
            None
        } else {
            Some(Arc::new(RegexSet::new(&config.excluded_paths)?))
        };

        Ok(Self {
            registry: Arc::new(registry),
            minimum_size: config.minimum_size,
            excluded_paths,
        })
    }

    /// Builds a dispatcher around an already probed registry.
    pub fn with_registry(registry: Registry, minimum_size: usize) -> Self {
        Self {
            registry: Arc::new(registry),
            minimum_size,
            excluded_paths: None,
        }
    }

    /// Returns the codec registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the minimum body size for compression.
    pub fn minimum_size(&self) -> usize {
        self.minimum_size
    }

    pub(crate) fn set_minimum_size(&mut self, size: usize) {
        self.minimum_size = size;
    }

    /// Chooses a codec for a request, if any.
    pub fn negotiate<B>(&self, req: &Request<B>) -> Option<Codec> {
        if self.is_excluded(req.uri().path()) {
            tracing::debug!(path = req.uri().path(), "path excluded from compression");
            return None;
        }

        let accepted = AcceptEncoding::from_headers(req.headers());
        negotiate(&accepted, self.registry.codecs())
    }

    /// Returns a fresh interceptor for the request, or `None` to forward the
    /// response untouched.
    pub fn dispatch<B>(&self, req: &Request<B>) -> Option<Interceptor> {
        let codec = self.negotiate(req)?;

        match self.registry.adapter(codec) {
            Ok(adapter) => Some(Interceptor::new(adapter, self.minimum_size)),
            Err(err) => {
                tracing::warn!(%codec, error = %err, "could not build encoder, not compressing");
                None
            }
        }
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths
            .as_ref()
            .is_some_and(|set| set.is_match(path))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_registry(Registry::available(), DEFAULT_MIN_SIZE)
    }
}
