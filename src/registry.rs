use crate::codec::{Codec, CodecAdapter};
use crate::config::{CodecLevels, CompressionConfig};
use crate::error::{CodecError, ConfigError};

/// Codecs this server can actually produce, in preference order.
///
/// Built once at startup by probing every configured codec; codecs whose
/// feature is not compiled in are left out, so negotiation can never pick
/// something that cannot be constructed. Immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    codec: Codec,
    level: u32,
}

impl Registry {
    /// Builds a registry from the configured order and levels.
    pub fn from_config(config: &CompressionConfig) -> Result<Self, ConfigError> {
        Self::probe_with(config, |codec, level| codec.adapter(level))
    }

    /// Every codec compiled into this build, in default order and levels.
    pub fn available() -> Self {
        let levels = CodecLevels::default();
        Self {
            entries: Codec::ALL
                .into_iter()
                .filter(Codec::is_available)
                .map(|codec| Entry {
                    codec,
                    level: levels.get(codec),
                })
                .collect(),
        }
    }

    pub(crate) fn probe_with<F>(config: &CompressionConfig, mut probe: F) -> Result<Self, ConfigError>
    where
        F: FnMut(Codec, u32) -> Result<CodecAdapter, CodecError>,
    {
        config.validate()?;

        let mut entries = Vec::with_capacity(config.preference.len());
        for &codec in &config.preference {
            let level = config.levels.get(codec);
            match probe(codec, level) {
                Ok(_) => entries.push(Entry { codec, level }),
                Err(CodecError::Unavailable(_)) => {
                    tracing::debug!(%codec, "codec not available in this build, not advertising it");
                }
                Err(err) => return Err(ConfigError::Level(err)),
            }
        }

        let registry = Self { entries };
        if registry.is_empty() {
            tracing::warn!("no configured codec is available, responses will not be compressed");
        } else {
            tracing::debug!(codecs = ?registry.codecs().collect::<Vec<_>>(), "compression registry ready");
        }
        Ok(registry)
    }

    /// Returns the available codecs, most preferred first.
    pub fn codecs(&self) -> impl Iterator<Item = Codec> + '_ {
        self.entries.iter().map(|entry| entry.codec)
    }

    /// Returns whether `codec` is registered.
    pub fn contains(&self, codec: Codec) -> bool {
        self.entries.iter().any(|entry| entry.codec == codec)
    }

    /// Returns whether no codec is available.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Creates a fresh adapter for a registered codec at its configured level.
    pub fn adapter(&self, codec: Codec) -> Result<CodecAdapter, CodecError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.codec == codec)
            .ok_or(CodecError::Unavailable(codec))?;
        codec.adapter(entry.level)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiate::{AcceptEncoding, negotiate};
    use crate::test_util::available_codecs;

    #[test]
    fn test_available_matches_features() {
        let registry = Registry::available();
        assert_eq!(registry.codecs().collect::<Vec<_>>(), available_codecs());
        assert_eq!(registry.contains(Codec::Brotli), cfg!(feature = "brotli"));
    }

    #[test]
    fn test_from_config_keeps_order() {
        let config = CompressionConfig {
            preference: vec![Codec::Deflate, Codec::Gzip, Codec::Zstd],
            ..Default::default()
        };
        let registry = Registry::from_config(&config).unwrap();
        let expected: Vec<_> = config
            .preference
            .iter()
            .copied()
            .filter(Codec::is_available)
            .collect();
        assert_eq!(registry.codecs().collect::<Vec<_>>(), expected);
    }

    #[test]
    #[cfg(all(feature = "gzip", feature = "deflate"))]
    fn test_unavailable_codec_excluded_from_negotiation() {
        let config = CompressionConfig {
            preference: vec![Codec::Brotli, Codec::Gzip, Codec::Deflate],
            ..Default::default()
        };
        let registry = Registry::probe_with(&config, |codec, level| match codec {
            Codec::Brotli => Err(CodecError::Unavailable(codec)),
            _ => codec.adapter(level),
        })
        .unwrap();

        assert!(!registry.contains(Codec::Brotli));
        assert!(matches!(
            registry.adapter(Codec::Brotli),
            Err(CodecError::Unavailable(Codec::Brotli))
        ));

        let accepted = AcceptEncoding::parse("br, gzip");
        assert_eq!(negotiate(&accepted, registry.codecs()), Some(Codec::Gzip));

        let accepted = AcceptEncoding::parse("br");
        assert_eq!(negotiate(&accepted, registry.codecs()), None);
    }

    #[test]
    #[cfg(not(feature = "brotli"))]
    fn test_brotli_never_negotiated_without_feature() {
        let config = CompressionConfig {
            preference: vec![Codec::Brotli, Codec::Gzip, Codec::Deflate],
            ..Default::default()
        };
        let registry = Registry::from_config(&config).unwrap();
        let accepted = AcceptEncoding::parse("br");
        assert_eq!(negotiate(&accepted, registry.codecs()), None);
    }

    #[test]
    fn test_nothing_available_yields_empty_registry() {
        let config = CompressionConfig::default();
        let registry =
            Registry::probe_with(&config, |codec, _| Err(CodecError::Unavailable(codec))).unwrap();

        assert!(registry.is_empty());
        assert_eq!(registry.codecs().count(), 0);
        let accepted = AcceptEncoding::parse("zstd, br, gzip, deflate");
        assert_eq!(negotiate(&accepted, registry.codecs()), None);
    }

    #[test]
    fn test_available_is_empty_only_without_codecs() {
        assert_eq!(Registry::available().is_empty(), available_codecs().is_empty());
    }

    #[test]
    fn test_invalid_level_is_config_error() {
        let config = CompressionConfig {
            levels: CodecLevels {
                gzip: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            Registry::from_config(&config),
            Err(ConfigError::Level(CodecError::InvalidLevel { .. }))
        ));
    }

    #[test]
    fn test_adapters_are_fresh() {
        let registry = Registry::available();
        for codec in registry.codecs() {
            let mut first = registry.adapter(codec).unwrap();
            first.flush().unwrap();
            let second = registry.adapter(codec).unwrap();
            assert!(!second.is_finished());
        }
    }
}
