use crate::codec::Codec;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Default minimum body size for compression (approximately 1 MTU).
pub const DEFAULT_MIN_SIZE: usize = 860;

/// Options recognized by [`Dispatcher`](crate::Dispatcher) and
/// [`CompressionLayer`](crate::CompressionLayer).
///
/// Every field has a default, so a partial document deserializes:
///
/// ```toml
/// minimum_size = 500
/// preference = ["br", "gzip"]
/// excluded_paths = ["^/metrics"]
///
/// [levels]
/// gzip = 6
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Bodies smaller than this many bytes are sent uncompressed.
    pub minimum_size: usize,

    /// Codecs the server is willing to use, most preferred first.
    pub preference: Vec<Codec>,

    /// Compression level per codec.
    pub levels: CodecLevels,

    /// Regular expressions matched against the request path; matching
    /// requests are never compressed.
    pub excluded_paths: Vec<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            minimum_size: DEFAULT_MIN_SIZE,
            preference: Codec::ALL.to_vec(),
            levels: CodecLevels::default(),
            excluded_paths: Vec::new(),
        }
    }
}

impl CompressionConfig {
    /// Checks the preference order and the levels of the listed codecs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, codec) in self.preference.iter().enumerate() {
            if self.preference[..i].contains(codec) {
                return Err(ConfigError::DuplicateCodec(*codec));
            }
            codec
                .validate_level(self.levels.get(*codec))
                .map_err(ConfigError::Level)?;
        }
        Ok(())
    }
}

/// Compression level for each codec.
///
/// See [`Codec::level_range`] for the accepted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecLevels {
    /// Zstd level.
    pub zstd: u32,
    /// Brotli quality.
    #[serde(alias = "br")]
    pub brotli: u32,
    /// Gzip level.
    pub gzip: u32,
    /// Deflate level.
    pub deflate: u32,
}

impl CodecLevels {
    /// Returns the configured level for `codec`.
    pub fn get(&self, codec: Codec) -> u32 {
        match codec {
            Codec::Zstd => self.zstd,
            Codec::Brotli => self.brotli,
            Codec::Gzip => self.gzip,
            Codec::Deflate => self.deflate,
        }
    }
}

impl Default for CodecLevels {
    fn default() -> Self {
        Self {
            zstd: Codec::Zstd.default_level(),
            brotli: Codec::Brotli.default_level(),
            gzip: Codec::Gzip.default_level(),
            deflate: Codec::Deflate.default_level(),
        }
    }
}
