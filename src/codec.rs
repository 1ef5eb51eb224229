use crate::error::CodecError;
use bytes::{Bytes, BytesMut};
#[cfg(feature = "brotli")]
use compression_codecs::brotli::{BrotliEncoder, params::EncoderParams as BrotliParams};
#[cfg(feature = "deflate")]
use compression_codecs::deflate::DeflateEncoder;
#[cfg(feature = "gzip")]
use compression_codecs::gzip::GzipEncoder;
#[cfg(feature = "zstd")]
use compression_codecs::zstd::ZstdEncoder;
use compression_codecs::EncodeV2;
#[cfg(any(feature = "brotli", feature = "deflate", feature = "gzip"))]
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::ops::RangeInclusive;

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// Supported compression codecs.
///
/// Each variant maps to one `Content-Encoding` token. Whether a codec can
/// actually be constructed depends on the Cargo feature of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Codec {
    /// Zstd compression.
    #[serde(rename = "zstd")]
    Zstd,
    /// Brotli compression.
    #[serde(rename = "br")]
    Brotli,
    /// Gzip compression.
    #[serde(rename = "gzip")]
    Gzip,
    /// Raw deflate compression (RFC 1951, no zlib wrapper).
    #[serde(rename = "deflate")]
    Deflate,
}

impl Codec {
    /// Every codec, in the default server preference order.
    pub const ALL: [Codec; 4] = [Codec::Zstd, Codec::Brotli, Codec::Gzip, Codec::Deflate];

    /// Returns the Content-Encoding header value for this codec.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            Codec::Zstd => "zstd",
            Codec::Brotli => "br",
            Codec::Gzip => "gzip",
            Codec::Deflate => "deflate",
        }
    }

    /// Returns the accepted compression levels for this codec.
    ///
    /// - gzip and deflate: 1 (fastest) to 9 (smallest)
    /// - brotli: 0 to 11
    /// - zstd: 1 to 22
    pub fn level_range(&self) -> RangeInclusive<u32> {
        match self {
            Codec::Zstd => 1..=22,
            Codec::Brotli => 0..=11,
            Codec::Gzip | Codec::Deflate => 1..=9,
        }
    }

    /// Returns the level used when none is configured.
    pub fn default_level(&self) -> u32 {
        match self {
            Codec::Zstd => 3,
            Codec::Brotli => 4,
            Codec::Gzip => 9,
            Codec::Deflate => 6,
        }
    }

    /// Returns whether this codec was compiled into the build.
    pub fn is_available(&self) -> bool {
        match self {
            Codec::Zstd => cfg!(feature = "zstd"),
            Codec::Brotli => cfg!(feature = "brotli"),
            Codec::Gzip => cfg!(feature = "gzip"),
            Codec::Deflate => cfg!(feature = "deflate"),
        }
    }

    /// Checks `level` against [`level_range`](Self::level_range).
    pub fn validate_level(&self, level: u32) -> Result<(), CodecError> {
        let range = self.level_range();
        if range.contains(&level) {
            Ok(())
        } else {
            Err(CodecError::InvalidLevel {
                codec: *self,
                level,
                min: *range.start(),
                max: *range.end(),
            })
        }
    }

    /// Creates a fresh incremental encoder for this codec.
    ///
    /// Fails with [`CodecError::Unavailable`] when the codec's feature is
    /// disabled, and with [`CodecError::InvalidLevel`] when `level` is out of
    /// range.
    pub fn adapter(&self, level: u32) -> Result<CodecAdapter, CodecError> {
        if !self.is_available() {
            return Err(CodecError::Unavailable(*self));
        }
        self.validate_level(level)?;

        Ok(CodecAdapter {
            codec: *self,
            encoder: Encoder::new(*self, level)?,
            output_buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
            finished: false,
        })
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_encoding())
    }
}

/// Concrete encoder behind a [`CodecAdapter`].
enum Encoder {
    #[cfg(feature = "zstd")]
    Zstd(ZstdEncoder),
    #[cfg(feature = "brotli")]
    Brotli(BrotliEncoder),
    #[cfg(feature = "gzip")]
    Gzip(GzipEncoder),
    #[cfg(feature = "deflate")]
    Deflate(DeflateEncoder),
}

impl Encoder {
    #[allow(unused_variables)]
    fn new(codec: Codec, level: u32) -> Result<Self, CodecError> {
        let precise = i32::try_from(level).map_err(|_| CodecError::InvalidLevel {
            codec,
            level,
            min: *codec.level_range().start(),
            max: *codec.level_range().end(),
        })?;

        match codec {
            #[cfg(feature = "zstd")]
            Codec::Zstd => Ok(Encoder::Zstd(ZstdEncoder::new(precise))),
            #[cfg(feature = "brotli")]
            Codec::Brotli => Ok(Encoder::Brotli(BrotliEncoder::new(
                BrotliParams::default().quality(Level::Precise(precise)),
            ))),
            #[cfg(feature = "gzip")]
            Codec::Gzip => Ok(Encoder::Gzip(GzipEncoder::new(
                Level::Precise(precise).into(),
            ))),
            #[cfg(feature = "deflate")]
            Codec::Deflate => Ok(Encoder::Deflate(DeflateEncoder::new(
                Level::Precise(precise).into(),
            ))),
            #[allow(unreachable_patterns)]
            _ => Err(CodecError::Unavailable(codec)),
        }
    }

    fn as_dyn(&mut self) -> &mut dyn EncodeV2 {
        match *self {
            #[cfg(feature = "zstd")]
            Encoder::Zstd(ref mut encoder) => encoder,
            #[cfg(feature = "brotli")]
            Encoder::Brotli(ref mut encoder) => encoder,
            #[cfg(feature = "gzip")]
            Encoder::Gzip(ref mut encoder) => encoder,
            #[cfg(feature = "deflate")]
            Encoder::Deflate(ref mut encoder) => encoder,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Drain {
    /// Emit pending output, keep the stream open.
    Sync,
    /// Emit pending output and the stream trailer.
    Finish,
}

/// Incremental compressor for a single response.
///
/// Feed body chunks through [`compress`](Self::compress) in order and call
/// [`flush`](Self::flush) exactly once at the end. The concatenation of all
/// returned buffers is one complete stream in the codec's format, whatever
/// the chunking of the input was.
pub struct CodecAdapter {
    codec: Codec,
    encoder: Encoder,
    output_buffer: Vec<u8>,
    finished: bool,
}

impl CodecAdapter {
    /// Returns the codec this adapter encodes with.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Returns whether [`flush`](Self::flush) has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Compresses a chunk of input data.
    ///
    /// The result may be empty when the encoder is still buffering
    /// internally.
    pub fn compress(&mut self, input: &[u8]) -> Result<Bytes, CodecError> {
        self.ensure_open()?;

        let codec = self.codec;
        let mut input_buf = PartialBuffer::new(input);
        let mut all_output = BytesMut::new();

        // Keep encoding until all input is consumed
        while input_buf.written_len() < input.len() {
            let consumed = input_buf.written_len();
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());

            self.encoder
                .as_dyn()
                .encode(&mut input_buf, &mut output)
                .map_err(|source| CodecError::Io { codec, source })?;

            let written = output.written_len();
            if written > 0 {
                all_output.extend_from_slice(&self.output_buffer[..written]);
            }

            if written == 0 && input_buf.written_len() == consumed {
                return Err(stalled(codec));
            }
        }

        Ok(all_output.freeze())
    }

    /// Emits everything compressed so far without ending the stream.
    pub fn sync_flush(&mut self) -> Result<Bytes, CodecError> {
        self.ensure_open()?;
        self.drain(Drain::Sync)
    }

    /// Finishes the stream and returns the remaining output.
    ///
    /// Any later call to `compress`, `sync_flush` or `flush` fails with
    /// [`CodecError::Finished`].
    pub fn flush(&mut self) -> Result<Bytes, CodecError> {
        self.ensure_open()?;
        self.finished = true;
        self.drain(Drain::Finish)
    }

    fn ensure_open(&self) -> Result<(), CodecError> {
        if self.finished {
            Err(CodecError::Finished(self.codec))
        } else {
            Ok(())
        }
    }

    fn drain(&mut self, mode: Drain) -> Result<Bytes, CodecError> {
        let codec = self.codec;
        let mut all_output = BytesMut::new();

        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let encoder = self.encoder.as_dyn();

            let done = match mode {
                Drain::Sync => encoder.flush(&mut output),
                Drain::Finish => encoder.finish(&mut output),
            }
            .map_err(|source| CodecError::Io { codec, source })?;

            let written = output.written_len();
            if written > 0 {
                all_output.extend_from_slice(&self.output_buffer[..written]);
            }

            if done {
                break;
            }
            if written == 0 {
                return Err(stalled(codec));
            }
        }

        Ok(all_output.freeze())
    }
}

impl fmt::Debug for CodecAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecAdapter")
            .field("codec", &self.codec)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

fn stalled(codec: Codec) -> CodecError {
    CodecError::Io {
        codec,
        source: io::Error::other("encoder made no progress"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{available_codecs, decode};

    fn compress_chunks(codec: Codec, chunks: &[&[u8]]) -> Vec<u8> {
        let mut adapter = codec.adapter(codec.default_level()).unwrap();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&adapter.compress(chunk).unwrap());
        }
        out.extend_from_slice(&adapter.flush().unwrap());
        out
    }

    #[test]
    fn test_content_encoding() {
        assert_eq!(Codec::Zstd.content_encoding(), "zstd");
        assert_eq!(Codec::Brotli.content_encoding(), "br");
        assert_eq!(Codec::Gzip.content_encoding(), "gzip");
        assert_eq!(Codec::Deflate.content_encoding(), "deflate");
        assert_eq!(Codec::Brotli.to_string(), "br");
    }

    #[test]
    fn test_default_levels_are_valid() {
        for codec in Codec::ALL {
            assert!(codec.validate_level(codec.default_level()).is_ok());
        }
    }

    #[test]
    fn test_level_out_of_range_rejected() {
        let err = Codec::Gzip.validate_level(10).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidLevel {
                codec: Codec::Gzip,
                level: 10,
                min: 1,
                max: 9
            }
        ));
        assert!(Codec::Brotli.validate_level(0).is_ok());
        assert!(Codec::Brotli.validate_level(12).is_err());
        assert!(Codec::Zstd.validate_level(0).is_err());
        assert!(Codec::Zstd.validate_level(22).is_ok());
    }

    #[test]
    #[cfg(feature = "gzip")]
    fn test_adapter_rejects_invalid_level() {
        assert!(matches!(
            Codec::Gzip.adapter(0),
            Err(CodecError::InvalidLevel { .. })
        ));
    }

    #[test]
    #[cfg(not(feature = "brotli"))]
    fn test_brotli_unavailable_without_feature() {
        assert!(!Codec::Brotli.is_available());
        assert!(matches!(
            Codec::Brotli.adapter(4),
            Err(CodecError::Unavailable(Codec::Brotli))
        ));
    }

    #[test]
    fn test_round_trip_single_chunk() {
        let payload = b"Hello, World! ".repeat(10);
        for codec in available_codecs() {
            let compressed = compress_chunks(codec, &[&payload]);
            assert_ne!(compressed, payload, "{codec} output looks uncompressed");
            assert_eq!(decode(codec, &compressed), payload, "{codec}");
        }
    }

    #[test]
    fn test_round_trip_incremental() {
        let first: &[u8] = b"This is the first part.";
        let second: &[u8] = b"This is the second part.";
        for codec in available_codecs() {
            let compressed = compress_chunks(codec, &[first, second]);
            assert_eq!(decode(codec, &compressed), [first, second].concat(), "{codec}");
        }
    }

    #[test]
    fn test_round_trip_empty_stream() {
        for codec in available_codecs() {
            let compressed = compress_chunks(codec, &[]);
            assert!(!compressed.is_empty(), "{codec} produced no trailer");
            assert!(decode(codec, &compressed).is_empty(), "{codec}");
        }
    }

    #[test]
    fn test_large_input_spans_output_buffer() {
        // Incompressible-ish input larger than the 8KB output buffer.
        let payload: Vec<u8> = (0..64 * 1024u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        for codec in available_codecs() {
            let compressed = compress_chunks(codec, &[&payload]);
            assert_eq!(decode(codec, &compressed), payload, "{codec}");
        }
    }

    #[test]
    fn test_sync_flush_keeps_stream_open() {
        for codec in available_codecs() {
            let mut adapter = codec.adapter(codec.default_level()).unwrap();
            let mut out = adapter.compress(b"hello ").unwrap().to_vec();
            let flushed = adapter.sync_flush().unwrap();
            assert!(!flushed.is_empty() || !out.is_empty(), "{codec}");
            out.extend_from_slice(&flushed);
            out.extend_from_slice(&adapter.compress(b"world").unwrap());
            out.extend_from_slice(&adapter.flush().unwrap());
            assert_eq!(decode(codec, &out), b"hello world", "{codec}");
        }
    }

    #[test]
    fn test_compress_after_flush_is_error() {
        for codec in available_codecs() {
            let mut adapter = codec.adapter(codec.default_level()).unwrap();
            adapter.compress(b"data").unwrap();
            adapter.flush().unwrap();
            assert!(adapter.is_finished());
            assert!(matches!(
                adapter.compress(b"more"),
                Err(CodecError::Finished(c)) if c == codec
            ));
        }
    }

    #[test]
    fn test_flush_twice_is_error() {
        for codec in available_codecs() {
            let mut adapter = codec.adapter(codec.default_level()).unwrap();
            adapter.flush().unwrap();
            assert!(matches!(adapter.flush(), Err(CodecError::Finished(_))));
            assert!(matches!(adapter.sync_flush(), Err(CodecError::Finished(_))));
        }
    }

    #[test]
    fn test_codec_serde_tokens() {
        #[derive(Deserialize)]
        struct Wrapper {
            order: Vec<Codec>,
        }
        let parsed: Wrapper = toml::from_str(r#"order = ["br", "gzip", "zstd", "deflate"]"#).unwrap();
        assert_eq!(
            parsed.order,
            vec![Codec::Brotli, Codec::Gzip, Codec::Zstd, Codec::Deflate]
        );
        assert!(toml::from_str::<Wrapper>(r#"order = ["identity"]"#).is_err());
    }

    mod chunking {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn chunk_boundaries_are_not_observable(
                payload in proptest::collection::vec(any::<u8>(), 1..4096),
                cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..8),
            ) {
                let mut points: Vec<usize> = cuts.iter().map(|c| c.index(payload.len())).collect();
                points.push(0);
                points.push(payload.len());
                points.sort_unstable();
                points.dedup();
                let chunks: Vec<&[u8]> = points.windows(2).map(|w| &payload[w[0]..w[1]]).collect();

                for codec in available_codecs() {
                    let whole = decode(codec, &compress_chunks(codec, &[&payload]));
                    let split = decode(codec, &compress_chunks(codec, &chunks));
                    prop_assert_eq!(&whole, &payload);
                    prop_assert_eq!(&split, &payload);
                }
            }
        }
    }
}
