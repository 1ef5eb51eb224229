use crate::config::CompressionConfig;
use crate::dispatch::Dispatcher;
use crate::error::ConfigError;
use crate::service::CompressionService;
use tower::Layer;

/// A Tower layer that compresses HTTP response bodies.
///
/// This layer wraps services and compresses response bodies based on the
/// client's Accept-Encoding header and the server's codec preference.
#[derive(Debug, Clone)]
pub struct CompressionLayer {
    dispatcher: Dispatcher,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    ///
    /// Every codec compiled into this build is offered, in the default
    /// order, and the minimum size for compression is 860 bytes.
    pub fn new() -> Self {
        Self {
            dispatcher: Dispatcher::default(),
        }
    }

    /// Creates a layer from configuration.
    ///
    /// Fails on invalid levels, duplicate codecs or invalid path patterns.
    pub fn with_config(config: &CompressionConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            dispatcher: Dispatcher::new(config)?,
        })
    }

    /// Sets the minimum body size required for compression.
    ///
    /// Bodies that end before reaching this many bytes are not compressed.
    pub fn min_size(mut self, size: usize) -> Self {
        self.dispatcher.set_minimum_size(size);
        self
    }

    /// Returns the dispatcher shared by every wrapped service.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl Default for CompressionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(inner, self.dispatcher.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::config::DEFAULT_MIN_SIZE;
    use crate::test_util::available_codecs;

    #[test]
    fn test_defaults() {
        let layer = CompressionLayer::new();
        assert_eq!(layer.dispatcher().minimum_size(), DEFAULT_MIN_SIZE);
        assert_eq!(
            layer.dispatcher().registry().codecs().collect::<Vec<_>>(),
            available_codecs()
        );
    }

    #[test]
    fn test_min_size_applies_to_services() {
        let layer = CompressionLayer::new().min_size(10);
        let service = layer.layer(());
        assert_eq!(service.dispatcher().minimum_size(), 10);
    }

    #[test]
    #[cfg(feature = "gzip")]
    fn test_with_config() {
        let config: CompressionConfig = toml::from_str(
            r#"
            minimum_size = 42
            preference = ["gzip"]
            "#,
        )
        .unwrap();
        let layer = CompressionLayer::with_config(&config).unwrap();
        assert_eq!(layer.dispatcher().minimum_size(), 42);
        assert!(layer.dispatcher().registry().contains(Codec::Gzip));
        assert!(!layer.dispatcher().registry().contains(Codec::Zstd));
    }

    #[test]
    fn test_with_config_rejects_duplicates() {
        let config = CompressionConfig {
            preference: vec![Codec::Gzip, Codec::Gzip],
            ..Default::default()
        };
        assert!(matches!(
            CompressionLayer::with_config(&config),
            Err(ConfigError::DuplicateCodec(Codec::Gzip))
        ));
    }
}
