//! Compression and decompression streams.

use std::io::{ErrorKind, Read, Write};
use std::str::FromStr;

use flate2::Compression as GzCompression;
use flate2::{
    bufread::{DeflateDecoder, MultiGzDecoder},
    write::{DeflateEncoder, GzEncoder},
};
use zstd::stream::read::Decoder as ZstdDecoder;
use zstd::stream::write::Encoder as ZstdEncoder;

use crate::io::{ComboReader, CountRead};

/// Specifies a compression or decompression format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Apply no codec. Pass data through as is.
    Raw,
    /// Gzip file format.
    Gzip,
    /// Raw DEFLATE bitstream (no gzip or zlib wrapper).
    Deflate,
    /// Brotli file format.
    Brotli,
    /// Zstandard file format.
    Zstd,
}

impl FromStr for CompressionFormat {
    type Err = std::io::Error;

    /// Parses a HTTP content coding or transfer coding token.
    ///
    /// Recognizes the tokens used in `Content-Encoding` and
    /// `Transfer-Encoding` header field values (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "identity" => Ok(Self::Raw),
            "gzip" | "x-gzip" => Ok(Self::Gzip),
            "deflate" => Ok(Self::Deflate),
            "br" => Ok(Self::Brotli),
            "zstd" => Ok(Self::Zstd),
            _ => Err(ErrorKind::InvalidInput.into()),
        }
    }
}

#[allow(clippy::large_enum_variant)]
enum Decoder<'a, S: Read> {
    Raw(ComboReader<S>),
    Gzip(MultiGzDecoder<ComboReader<S>>),
    Deflate(DeflateDecoder<ComboReader<S>>),
    Brotli(Box<brotli::Decompressor<ComboReader<S>>>),
    Zstd(ZstdDecoder<'a, ComboReader<S>>),
}

impl<'a, S: Read> Decoder<'a, S> {
    fn name(&self) -> &'static str {
        match self {
            Decoder::Raw(_) => "raw",
            Decoder::Gzip(_) => "gzip",
            Decoder::Deflate(_) => "deflate",
            Decoder::Brotli(_) => "brotli",
            Decoder::Zstd(_) => "zstd",
        }
    }
}

/// Decompression of Gzip, Deflate, Brotli, and Zstd streams.
pub struct Decompressor<'a, S: Read> {
    decoder: Decoder<'a, S>,
}

impl<'a, S: Read> Decompressor<'a, S> {
    fn new_impl(stream: S, allow_unknown: bool) -> std::io::Result<Self> {
        let mut stream = ComboReader::new(stream);
        let magic_bytes = stream.peek(4)?.to_vec();

        tracing::debug!(?magic_bytes, "decompressor analysis");

        let decoder = match magic_bytes.get(0..4) {
            Some([0x1f, 0x8b, _, _]) => Decoder::Gzip(MultiGzDecoder::new(stream)),
            Some([0x28, 0xb5, 0x2f, 0xfd]) | Some([0x37, 0xa4, 0x30, 0xec]) => {
                Decoder::Zstd(ZstdDecoder::with_buffer(stream)?)
            }
            _ => {
                if allow_unknown {
                    Decoder::Raw(stream)
                } else {
                    return Err(ErrorKind::InvalidData.into());
                }
            }
        };
        tracing::debug!(decoder = decoder.name(), "decoder select");

        Ok(Self { decoder })
    }

    /// Open a compressed stream, sniffing the format from the magic bytes.
    ///
    /// Returns an error for unrecognized formats. This only distinguishes
    /// formats with a magic byte signature (gzip, zstd); deflate and brotli
    /// have none and must be selected with [Self::new_format].
    pub fn new(stream: S) -> std::io::Result<Self> {
        Self::new_impl(stream, false)
    }

    /// Open a compressed stream or pass through contents unchanged for
    /// unrecognized formats.
    pub fn new_allow_unknown(stream: S) -> std::io::Result<Self> {
        Self::new_impl(stream, true)
    }

    /// Open a stream with an explicitly known codec.
    pub fn new_format(stream: S, format: CompressionFormat) -> std::io::Result<Self> {
        let stream = ComboReader::new(stream);

        let decoder = match format {
            CompressionFormat::Raw => Decoder::Raw(stream),
            CompressionFormat::Gzip => Decoder::Gzip(MultiGzDecoder::new(stream)),
            CompressionFormat::Deflate => Decoder::Deflate(DeflateDecoder::new(stream)),
            CompressionFormat::Brotli => {
                Decoder::Brotli(Box::new(brotli::Decompressor::new(stream, 4096)))
            }
            CompressionFormat::Zstd => Decoder::Zstd(ZstdDecoder::with_buffer(stream)?),
        };

        tracing::debug!(decoder = decoder.name(), "decoder select");

        Ok(Self { decoder })
    }

    /// Returns a reference to the wrapped stream.
    pub fn get_ref(&self) -> &S {
        match &self.decoder {
            Decoder::Raw(stream) => stream.get_ref(),
            Decoder::Gzip(stream) => stream.get_ref().get_ref(),
            Decoder::Deflate(stream) => stream.get_ref().get_ref(),
            Decoder::Brotli(stream) => stream.get_ref().get_ref(),
            Decoder::Zstd(stream) => stream.get_ref().get_ref(),
        }
    }

    /// Returns a mutable reference to the wrapped stream.
    pub fn get_mut(&mut self) -> &mut S {
        match &mut self.decoder {
            Decoder::Raw(stream) => stream.get_mut(),
            Decoder::Gzip(stream) => stream.get_mut().get_mut(),
            Decoder::Deflate(stream) => stream.get_mut().get_mut(),
            Decoder::Brotli(stream) => stream.get_mut().get_mut(),
            Decoder::Zstd(stream) => stream.get_mut().get_mut(),
        }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> S {
        match self.decoder {
            Decoder::Raw(stream) => stream.into_inner(),
            Decoder::Gzip(stream) => stream.into_inner().into_inner(),
            Decoder::Deflate(stream) => stream.into_inner().into_inner(),
            Decoder::Brotli(stream) => stream.into_inner().into_inner(),
            Decoder::Zstd(stream) => stream.finish().into_inner(),
        }
    }

    /// Returns the number of bytes read from the wrapped stream.
    pub fn raw_input_read_count(&self) -> u64 {
        match &self.decoder {
            Decoder::Raw(stream) => stream.read_count(),
            Decoder::Gzip(stream) => stream.get_ref().read_count(),
            Decoder::Deflate(stream) => stream.get_ref().read_count(),
            Decoder::Brotli(stream) => stream.get_ref().read_count(),
            Decoder::Zstd(stream) => stream.get_ref().read_count(),
        }
    }
}

impl<'a, S: Read> Read for Decompressor<'a, S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.decoder {
            Decoder::Raw(stream) => stream.read(buf),
            Decoder::Gzip(stream) => stream.read(buf),
            Decoder::Deflate(stream) => stream.read(buf),
            Decoder::Brotli(stream) => stream.read(buf),
            Decoder::Zstd(stream) => stream.read(buf),
        }
    }
}

enum Encoder<'a, S: Write> {
    Raw(S),
    Gzip(GzEncoder<S>),
    Deflate(DeflateEncoder<S>),
    Zstd(ZstdEncoder<'a, S>),
}

/// Specifies a compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Fastest speed but with low compression ratio.
    Fast,

    /// Default level specified by the codec.
    CodecDefault,

    /// Recommended balanced ratio of speed and compression.
    ///
    /// Default value.
    Optimal,

    /// Almost best compression ratio at the cost of slow speed.
    High,
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::Optimal
    }
}

impl CompressionLevel {
    fn get_int_for_format(&self, format: CompressionFormat) -> i32 {
        match format {
            CompressionFormat::Raw => 0,
            CompressionFormat::Gzip | CompressionFormat::Deflate => match self {
                CompressionLevel::Fast => 1,
                CompressionLevel::CodecDefault => 6,
                CompressionLevel::Optimal => 9,
                CompressionLevel::High => 9,
            },
            CompressionFormat::Brotli => match self {
                CompressionLevel::Fast => 1,
                CompressionLevel::CodecDefault => 9,
                CompressionLevel::Optimal => 9,
                CompressionLevel::High => 11,
            },
            CompressionFormat::Zstd => match self {
                CompressionLevel::Fast => 1,
                CompressionLevel::CodecDefault => 3,
                CompressionLevel::Optimal => 3,
                CompressionLevel::High => 19,
            },
        }
    }
}

/// Compression of gzip, deflate, and Zstd streams.
///
/// Brotli compression (as opposed to decompression) is not offered because
/// this crate never writes record content, only passes it through.
pub struct Compressor<'a, S: Write> {
    encoder: Encoder<'a, S>,
}

impl<'a, S: Write> Compressor<'a, S> {
    /// Create a compressor with the given stream and codec options.
    pub fn new(
        stream: S,
        format: CompressionFormat,
        level: CompressionLevel,
    ) -> std::io::Result<Self> {
        let encoder = match format {
            CompressionFormat::Raw => Encoder::Raw(stream),
            CompressionFormat::Gzip => Encoder::Gzip(GzEncoder::new(
                stream,
                GzCompression::new(level.get_int_for_format(format) as u32),
            )),
            CompressionFormat::Deflate => Encoder::Deflate(DeflateEncoder::new(
                stream,
                GzCompression::new(level.get_int_for_format(format) as u32),
            )),
            CompressionFormat::Brotli => {
                return Err(ErrorKind::Unsupported.into());
            }
            CompressionFormat::Zstd => {
                Encoder::Zstd(ZstdEncoder::new(stream, level.get_int_for_format(format))?)
            }
        };
        Ok(Self { encoder })
    }

    /// Returns a reference to the wrapped stream.
    pub fn get_ref(&self) -> &S {
        match &self.encoder {
            Encoder::Raw(stream) => stream,
            Encoder::Gzip(stream) => stream.get_ref(),
            Encoder::Deflate(stream) => stream.get_ref(),
            Encoder::Zstd(stream) => stream.get_ref(),
        }
    }

    /// Returns a mutable reference to the wrapped stream.
    pub fn get_mut(&mut self) -> &mut S {
        match &mut self.encoder {
            Encoder::Raw(stream) => stream,
            Encoder::Gzip(stream) => stream.get_mut(),
            Encoder::Deflate(stream) => stream.get_mut(),
            Encoder::Zstd(stream) => stream.get_mut(),
        }
    }

    /// Completes a compression stream and returns the wrapped stream.
    pub fn finish(self) -> std::io::Result<S> {
        match self.encoder {
            Encoder::Raw(stream) => Ok(stream),
            Encoder::Gzip(stream) => stream.finish(),
            Encoder::Deflate(stream) => stream.finish(),
            Encoder::Zstd(stream) => stream.finish(),
        }
    }
}

impl<'a, S: Write> Write for Compressor<'a, S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.encoder {
            Encoder::Raw(stream) => stream.write(buf),
            Encoder::Gzip(stream) => stream.write(buf),
            Encoder::Deflate(stream) => stream.write(buf),
            Encoder::Zstd(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.encoder {
            Encoder::Raw(stream) => stream.flush(),
            Encoder::Gzip(stream) => stream.flush(),
            Encoder::Deflate(stream) => stream.flush(),
            Encoder::Zstd(stream) => stream.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_format_from_str() {
        assert_eq!(CompressionFormat::from_str("gzip").unwrap(), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::from_str("GZIP").unwrap(), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::from_str("br").unwrap(), CompressionFormat::Brotli);
        assert_eq!(CompressionFormat::from_str("deflate").unwrap(), CompressionFormat::Deflate);
        assert_eq!(CompressionFormat::from_str("zstd").unwrap(), CompressionFormat::Zstd);
        assert!(CompressionFormat::from_str("bogus").is_err());
    }

    #[test]
    fn test_gzip_round_trip() {
        let mut compressor =
            Compressor::new(Vec::new(), CompressionFormat::Gzip, CompressionLevel::Fast).unwrap();
        compressor.write_all(b"hello world").unwrap();
        let compressed = compressor.finish().unwrap();

        let mut decompressor = Decompressor::new(Cursor::new(compressed)).unwrap();
        let mut output = Vec::new();
        decompressor.read_to_end(&mut output).unwrap();

        assert_eq!(output, b"hello world");
    }

    #[test]
    fn test_deflate_round_trip() {
        let mut compressor = Compressor::new(
            Vec::new(),
            CompressionFormat::Deflate,
            CompressionLevel::Fast,
        )
        .unwrap();
        compressor.write_all(b"hello world").unwrap();
        let compressed = compressor.finish().unwrap();

        let mut decompressor =
            Decompressor::new_format(Cursor::new(compressed), CompressionFormat::Deflate).unwrap();
        let mut output = Vec::new();
        decompressor.read_to_end(&mut output).unwrap();

        assert_eq!(output, b"hello world");
    }
}
