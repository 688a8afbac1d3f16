//! Record-at-a-time gzip member locator.
//!
//! WARC files are conventionally stored as a concatenation of independent
//! gzip members, one per record, so that any record can be decompressed on
//! its own. No available gzip crate exposes per-member boundary events on a
//! concatenated stream, so this module walks the container directly:
//! RFC 1952 header parsing, [flate2::Decompress] in raw (headerless) mode
//! for the body, then the 8-byte CRC32+ISIZE footer.

use std::io::{BufRead, Read};

use flate2::{Decompress, FlushDecompress, Status};
use thiserror::Error;

use crate::io::{ComboReader, CountRead, PeekRead};

/// Errors from locating or decoding gzip members.
#[derive(Debug, Error)]
pub enum GzipMemberError {
    /// Not a gzip member (bad magic bytes or unsupported compression method).
    #[error("not a gzip member at offset {offset}")]
    NotGzip {
        /// Byte offset where the member was expected to start.
        offset: u64,
    },

    /// The member ended before a complete DEFLATE stream or footer was read.
    #[error("truncated gzip member at offset {offset}")]
    Truncated {
        /// Byte offset where the member started.
        offset: u64,
    },

    /// The DEFLATE stream itself was corrupt.
    #[error("corrupt gzip member data at offset {offset}")]
    CorruptData {
        /// Byte offset where the member started.
        offset: u64,
        /// Underlying decompression error.
        #[source]
        source: flate2::DecompressError,
    },

    /// IO error reading the underlying stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Offsets describing one gzip member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberLocation {
    /// Offset of the member's first byte in the compressed stream.
    pub compressed_start: u64,
    /// Offset one past the member's 8-byte footer.
    pub compressed_end: u64,
    /// Offset of the member's first decompressed byte in the virtual
    /// fully-decompressed stream.
    pub uncompressed_start: u64,
    /// Offset one past the member's last decompressed byte.
    pub uncompressed_end: u64,
}

impl MemberLocation {
    /// Number of decompressed bytes this member contains.
    pub fn uncompressed_length(&self) -> u64 {
        self.uncompressed_end - self.uncompressed_start
    }
}

/// Reads a concatenation of independent gzip members one at a time.
pub struct GzipMemberLocator<R: Read> {
    stream: ComboReader<R>,
    uncompressed_total: u64,
    member_count: u64,
}

impl<R: Read> GzipMemberLocator<R> {
    /// Creates a locator over the given compressed stream.
    pub fn new(stream: R) -> Self {
        Self {
            stream: ComboReader::new(stream),
            uncompressed_total: 0,
            member_count: 0,
        }
    }

    /// Reads and decompresses the next member, returning its offsets and
    /// decompressed bytes, or `None` at a clean end of stream.
    ///
    /// Emits a warning if this turns out to be the only member in the
    /// stream (suggesting the file is whole-file-gzipped rather than
    /// record-at-a-time).
    pub fn next_member(&mut self) -> Result<Option<(MemberLocation, Vec<u8>)>, GzipMemberError> {
        let compressed_start = self.stream.read_count();

        if self.stream.peek(1)?.is_empty() {
            if self.member_count == 1 {
                tracing::warn!("gzip stream contains only a single member; it may not be record-at-a-time");
            }
            return Ok(None);
        }

        self.read_member_header(compressed_start)?;
        let decompressed = self.read_member_body(compressed_start)?;
        self.read_member_footer(compressed_start, decompressed.len() as u64)?;

        let compressed_end = self.stream.read_count();
        let uncompressed_start = self.uncompressed_total;
        let uncompressed_end = uncompressed_start + decompressed.len() as u64;
        self.uncompressed_total = uncompressed_end;
        self.member_count += 1;

        tracing::debug!(
            compressed_start,
            compressed_end,
            uncompressed_start,
            uncompressed_end,
            "located gzip member"
        );

        Ok(Some((
            MemberLocation {
                compressed_start,
                compressed_end,
                uncompressed_start,
                uncompressed_end,
            },
            decompressed,
        )))
    }

    fn read_member_header(&mut self, offset: u64) -> Result<(), GzipMemberError> {
        let mut fixed = [0u8; 10];
        self.stream
            .read_exact(&mut fixed)
            .map_err(|_| GzipMemberError::Truncated { offset })?;

        if fixed[0] != 0x1f || fixed[1] != 0x8b || fixed[2] != 0x08 {
            return Err(GzipMemberError::NotGzip { offset });
        }

        let flags = fixed[3];
        const FEXTRA: u8 = 0x04;
        const FNAME: u8 = 0x08;
        const FCOMMENT: u8 = 0x10;
        const FHCRC: u8 = 0x02;

        if flags & FEXTRA != 0 {
            let mut len_bytes = [0u8; 2];
            self.stream.read_exact(&mut len_bytes)?;
            let len = u16::from_le_bytes(len_bytes) as usize;
            let mut buf = vec![0u8; len];
            self.stream.read_exact(&mut buf)?;
        }
        if flags & FNAME != 0 {
            let mut buf = Vec::new();
            self.stream.read_until(0, &mut buf)?;
        }
        if flags & FCOMMENT != 0 {
            let mut buf = Vec::new();
            self.stream.read_until(0, &mut buf)?;
        }
        if flags & FHCRC != 0 {
            let mut crc = [0u8; 2];
            self.stream.read_exact(&mut crc)?;
        }

        Ok(())
    }

    fn read_member_body(&mut self, offset: u64) -> Result<Vec<u8>, GzipMemberError> {
        let mut decompress = Decompress::new(false);
        let mut output = Vec::new();
        let mut chunk = vec![0u8; 32 * 1024];

        loop {
            let input = self
                .stream
                .fill_buf()
                .map_err(|_| GzipMemberError::Truncated { offset })?;

            if input.is_empty() {
                return Err(GzipMemberError::Truncated { offset });
            }

            let before_in = decompress.total_in();
            let before_out = decompress.total_out();

            let status = decompress
                .decompress_vec(input, &mut output, FlushDecompress::None)
                .map_err(|source| GzipMemberError::CorruptData { offset, source })?;

            let consumed = (decompress.total_in() - before_in) as usize;
            let _produced = decompress.total_out() - before_out;
            self.stream.consume(consumed);

            if status == Status::StreamEnd {
                break;
            }
            if consumed == 0 && status == Status::Ok {
                return Err(GzipMemberError::Truncated { offset });
            }
        }

        Ok(output)
    }

    fn read_member_footer(&mut self, offset: u64, uncompressed_len: u64) -> Result<(), GzipMemberError> {
        let mut footer = [0u8; 8];
        self.stream
            .read_exact(&mut footer)
            .map_err(|_| GzipMemberError::Truncated { offset })?;

        let isize_field = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);
        let actual = (uncompressed_len % (1u64 << 32)) as u32;

        if isize_field != actual {
            tracing::warn!(
                offset,
                expected = isize_field,
                actual,
                "gzip member ISIZE does not match decompressed length"
            );
        }

        Ok(())
    }

    /// Total number of members located so far.
    pub fn member_count(&self) -> u64 {
        self.member_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_member(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_single_member() {
        let gz = make_member(b"hello world");
        let mut locator = GzipMemberLocator::new(std::io::Cursor::new(gz.clone()));

        let (location, decompressed) = locator.next_member().unwrap().unwrap();
        assert_eq!(decompressed, b"hello world");
        assert_eq!(location.compressed_start, 0);
        assert_eq!(location.compressed_end, gz.len() as u64);
        assert_eq!(location.uncompressed_start, 0);
        assert_eq!(location.uncompressed_end, 11);

        assert!(locator.next_member().unwrap().is_none());
    }

    #[test]
    fn test_concatenated_members() {
        let mut combined = make_member(b"abc");
        combined.extend(make_member(b"defgh"));

        let mut locator = GzipMemberLocator::new(std::io::Cursor::new(combined));

        let (loc1, data1) = locator.next_member().unwrap().unwrap();
        assert_eq!(data1, b"abc");
        assert_eq!(loc1.uncompressed_start, 0);
        assert_eq!(loc1.uncompressed_end, 3);

        let (loc2, data2) = locator.next_member().unwrap().unwrap();
        assert_eq!(data2, b"defgh");
        assert_eq!(loc2.uncompressed_start, 3);
        assert_eq!(loc2.uncompressed_end, 8);
        assert_eq!(loc2.compressed_start, loc1.compressed_end);

        assert!(locator.next_member().unwrap().is_none());
    }
}
