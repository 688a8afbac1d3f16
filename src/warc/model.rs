//! Record model: byte ranges with lazy-or-cached access, and the WARC
//! entities built on top of them.

use std::{
    borrow::Cow,
    cell::RefCell,
    io::{Read, Seek, SeekFrom},
    rc::Rc,
};

use crate::header::HeaderMap;

use super::WARCError;

/// A shared, non-owning handle to a stream.
///
/// Records borrow this rather than the stream itself so that many records
/// can outlive a single parsing pass over the same underlying resource.
pub type StreamHandle<S> = Rc<RefCell<S>>;

/// Where a [RangeData]'s bytes come from.
pub enum ByteSource<S> {
    /// Bytes were copied into memory at parse time.
    Owned(Vec<u8>),
    /// Bytes are read on demand from the stream, identified by the
    /// enclosing [RangeData]'s own `start`/`end`.
    Borrowed(StreamHandle<S>),
    /// Both a cached copy and a stream back-reference are available; the
    /// cached copy is preferred.
    Both(Vec<u8>, StreamHandle<S>),
}

/// A half-open byte range `[start, end)` in some stream, with either cached
/// bytes, a lazy stream back-reference, or both.
pub struct RangeData<S> {
    start: u64,
    end: u64,
    source: Option<ByteSource<S>>,
}

impl<S: Read + Seek> RangeData<S> {
    /// Creates a range with no byte source attached yet.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            source: None,
        }
    }

    /// Creates a range backed only by cached bytes.
    pub fn with_owned(start: u64, end: u64, bytes: Vec<u8>) -> Self {
        Self {
            start,
            end,
            source: Some(ByteSource::Owned(bytes)),
        }
    }

    /// Creates a range backed only by a lazy stream reference.
    pub fn with_stream(start: u64, end: u64, handle: StreamHandle<S>) -> Self {
        Self {
            start,
            end,
            source: Some(ByteSource::Borrowed(handle)),
        }
    }

    /// Creates a range backed by both cached bytes and a stream reference.
    pub fn with_both(start: u64, end: u64, bytes: Vec<u8>, handle: StreamHandle<S>) -> Self {
        Self {
            start,
            end,
            source: Some(ByteSource::Both(bytes, handle)),
        }
    }

    /// Start offset, inclusive.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// End offset, exclusive.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Length in bytes.
    pub fn length(&self) -> u64 {
        self.end - self.start
    }

    /// Returns the bytes of this range, preferring a cached copy over a
    /// stream read.
    ///
    /// Fails with [WARCError::Access] if this range has neither cached bytes
    /// nor a stream back-reference.
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>, WARCError> {
        match &self.source {
            Some(ByteSource::Owned(bytes)) | Some(ByteSource::Both(bytes, _)) => {
                Ok(Cow::Borrowed(bytes))
            }
            Some(ByteSource::Borrowed(handle)) => {
                let mut stream = handle.borrow_mut();
                let saved = stream.stream_position().map_err(WARCError::from)?;
                let result = (|| -> std::io::Result<Vec<u8>> {
                    stream.seek(SeekFrom::Start(self.start))?;
                    let mut buf = vec![0u8; self.length() as usize];
                    stream.read_exact(&mut buf)?;
                    Ok(buf)
                })();
                stream.seek(SeekFrom::Start(saved)).map_err(WARCError::from)?;
                result.map(Cow::Owned).map_err(WARCError::from)
            }
            None => Err(WARCError::Access {
                start: self.start,
                end: self.end,
            }),
        }
    }

    /// Returns a lazily-pulled iterator over chunks of this range's bytes.
    pub fn iterator(&self, chunk_size: usize) -> RangeChunks<S> {
        match &self.source {
            Some(ByteSource::Owned(bytes)) | Some(ByteSource::Both(bytes, _)) => {
                RangeChunks::memory(self.start, self.end, bytes.clone(), chunk_size)
            }
            Some(ByteSource::Borrowed(handle)) => {
                RangeChunks::stream(self.start, self.end, handle.clone(), chunk_size)
            }
            None => RangeChunks::empty_error(self.start, self.end),
        }
    }
}

/// Lazy chunked reader over a [RangeData].
pub enum RangeChunks<S> {
    /// Backed by an in-memory copy of the range.
    Memory {
        bytes: Vec<u8>,
        base: u64,
        pos: u64,
        end: u64,
        chunk_size: usize,
    },
    /// Backed by a stream, re-read chunk by chunk with the cursor restored
    /// after each read.
    Stream {
        handle: StreamHandle<S>,
        pos: u64,
        end: u64,
        chunk_size: usize,
    },
    /// No byte source was ever attached to the range.
    NoSource { reported: bool },
}

impl<S> RangeChunks<S> {
    fn memory(start: u64, end: u64, bytes: Vec<u8>, chunk_size: usize) -> Self {
        RangeChunks::Memory {
            bytes,
            base: start,
            pos: start,
            end,
            chunk_size: chunk_size.max(1),
        }
    }

    fn stream(start: u64, end: u64, handle: StreamHandle<S>, chunk_size: usize) -> Self {
        RangeChunks::Stream {
            handle,
            pos: start,
            end,
            chunk_size: chunk_size.max(1),
        }
    }

    fn empty_error(_start: u64, _end: u64) -> Self {
        RangeChunks::NoSource { reported: false }
    }
}

impl<S: Read + Seek> Iterator for RangeChunks<S> {
    type Item = std::io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RangeChunks::Memory {
                bytes,
                base,
                pos,
                end,
                chunk_size,
            } => {
                if *pos >= *end {
                    return None;
                }
                let want = (*chunk_size).min((*end - *pos) as usize);
                let offset = (*pos - *base) as usize;
                let chunk = bytes[offset..offset + want].to_vec();
                *pos += want as u64;
                Some(Ok(chunk))
            }
            RangeChunks::Stream {
                handle,
                pos,
                end,
                chunk_size,
            } => {
                if *pos >= *end {
                    return None;
                }
                let want = (*chunk_size).min((*end - *pos) as usize);
                let mut stream = handle.borrow_mut();
                let result = (|| -> std::io::Result<Vec<u8>> {
                    let saved = stream.stream_position()?;
                    stream.seek(SeekFrom::Start(*pos))?;
                    let mut buf = vec![0u8; want];
                    stream.read_exact(&mut buf)?;
                    stream.seek(SeekFrom::Start(saved))?;
                    Ok(buf)
                })();
                if result.is_ok() {
                    *pos += want as u64;
                }
                Some(result)
            }
            RangeChunks::NoSource { reported } => {
                if *reported {
                    None
                } else {
                    *reported = true;
                    Some(Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "byte range has no source",
                    )))
                }
            }
        }
    }
}

/// Splits raw header bytes into a name-value [HeaderMap].
///
/// Lines are split on `CRLF`; each non-empty line is split on its first
/// `:`, with surrounding whitespace trimmed from the value. Line folding
/// (a continuation line starting with a space or tab) is not supported: a
/// folded line is stored as its own malformed field rather than being
/// joined to the previous one.
pub fn parse_bytes_into_fields(data: &[u8]) -> HeaderMap {
    let mut map = HeaderMap::new();

    for line in data.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line.is_empty() {
            continue;
        }

        match line.iter().position(|&b| b == b':') {
            Some(colon) => {
                let name = &line[..colon];
                let value = trim_ascii(&line[colon + 1..]);
                map.append(name, value);
            }
            None => {
                map.append(line, &b""[..]);
            }
        }
    }

    map
}

fn trim_ascii(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|p| p + 1)
        .unwrap_or(start);
    &data[start..end]
}

/// A record's header section.
pub struct Header<S> {
    range: RangeData<S>,
    fields: Option<HeaderMap>,
}

impl<S: Read + Seek> Header<S> {
    /// Creates a `Header` from a byte range, optionally parsing its fields
    /// immediately if cached bytes are available and parsing was requested.
    pub fn new(range: RangeData<S>, parse_fields: bool) -> Self {
        let fields = if parse_fields {
            range.bytes().ok().map(|bytes| parse_bytes_into_fields(&bytes))
        } else {
            None
        };

        Self { range, fields }
    }

    /// Start offset, inclusive.
    pub fn start(&self) -> u64 {
        self.range.start()
    }

    /// End offset, exclusive.
    pub fn end(&self) -> u64 {
        self.range.end()
    }

    /// Length in bytes.
    pub fn length(&self) -> u64 {
        self.range.length()
    }

    /// Raw header bytes.
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>, WARCError> {
        self.range.bytes()
    }

    /// Lazily-pulled chunks of the raw header bytes.
    pub fn iterator(&self, chunk_size: usize) -> RangeChunks<S> {
        self.range.iterator(chunk_size)
    }

    /// The parsed field map, if parsing was requested and succeeded.
    pub fn fields(&self) -> Option<&HeaderMap> {
        self.fields.as_ref()
    }

    /// Returns a field's value, an optional fallback, and optionally all
    /// values for the name rather than just the first.
    pub fn get_field(&self, name: &str, fallback: Option<&str>) -> Option<String> {
        self.fields
            .as_ref()
            .and_then(|fields| fields.get_str(name).map(|s| s.to_string()))
            .or_else(|| fallback.map(|s| s.to_string()))
    }

    /// Returns every value associated with `name`, in order.
    pub fn get_all_fields(&self, name: &str) -> Vec<String> {
        match &self.fields {
            Some(fields) => fields.get_all(name).map(|v| v.text.clone()).collect(),
            None => Vec::new(),
        }
    }
}

/// A record's content block (payload).
pub struct ContentBlock<S> {
    range: RangeData<S>,
}

impl<S: Read + Seek> ContentBlock<S> {
    /// Creates a `ContentBlock` from a byte range.
    pub fn new(range: RangeData<S>) -> Self {
        Self { range }
    }

    /// Start offset, inclusive.
    pub fn start(&self) -> u64 {
        self.range.start()
    }

    /// End offset, exclusive.
    pub fn end(&self) -> u64 {
        self.range.end()
    }

    /// Length in bytes.
    pub fn length(&self) -> u64 {
        self.range.length()
    }

    /// Raw content bytes.
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>, WARCError> {
        self.range.bytes()
    }

    /// Lazily-pulled chunks of the raw content bytes.
    pub fn iterator(&self, chunk_size: usize) -> RangeChunks<S> {
        self.range.iterator(chunk_size)
    }
}

/// A byte run between two records that did not parse as a WARC header.
pub struct UnparsableLine<S> {
    range: RangeData<S>,
}

impl<S: Read + Seek> UnparsableLine<S> {
    /// Creates an `UnparsableLine` from a byte range.
    pub fn new(range: RangeData<S>) -> Self {
        Self { range }
    }

    /// Start offset, inclusive.
    pub fn start(&self) -> u64 {
        self.range.start()
    }

    /// End offset, exclusive.
    pub fn end(&self) -> u64 {
        self.range.end()
    }

    /// Raw bytes of the line.
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>, WARCError> {
        self.range.bytes()
    }
}

/// A parsed WARC record.
pub struct Record<S> {
    range: RangeData<S>,
    header: Option<Header<S>>,
    content_block: Option<ContentBlock<S>>,
    content_length_check_result: Option<bool>,
}

impl<S: Read + Seek> Record<S> {
    /// Creates a `Record` from a byte range, with optional header/content
    /// block sub-sections.
    pub fn new(
        range: RangeData<S>,
        header: Option<Header<S>>,
        content_block: Option<ContentBlock<S>>,
    ) -> Self {
        Self {
            range,
            header,
            content_block,
            content_length_check_result: None,
        }
    }

    /// Start offset, inclusive.
    pub fn start(&self) -> u64 {
        self.range.start()
    }

    /// End offset, exclusive.
    pub fn end(&self) -> u64 {
        self.range.end()
    }

    /// Length in bytes.
    pub fn length(&self) -> u64 {
        self.range.length()
    }

    /// Raw bytes of the whole record (header + content block).
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>, WARCError> {
        self.range.bytes()
    }

    /// The record's header section, when the record was split.
    pub fn header(&self) -> Option<&Header<S>> {
        self.header.as_ref()
    }

    /// The record's content block, when the record was split.
    pub fn content_block(&self) -> Option<&ContentBlock<S>> {
        self.content_block.as_ref()
    }

    /// The outcome of the last [Self::check_content_length] call.
    pub fn content_length_check_result(&self) -> Option<bool> {
        self.content_length_check_result
    }

    /// Returns a named WARC header field, if the record is split and has
    /// parsed fields.
    pub fn warc_field(&self, name: &str) -> Option<String> {
        self.header.as_ref().and_then(|h| h.get_field(name, None))
    }

    /// Compares the content block's actual length against the record's
    /// stated `Content-Length` header, caching and returning the result.
    ///
    /// Returns `false` (not an error) when the record isn't split or the
    /// header is missing or unparsable.
    pub fn check_content_length(&mut self) -> bool {
        let result = match (&self.header, &self.content_block) {
            (Some(header), Some(content_block)) => header
                .get_field("Content-Length", None)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|expected| expected == content_block.length())
                .unwrap_or(false),
            _ => false,
        };

        self.content_length_check_result = Some(result);
        result
    }

    /// Returns the captured HTTP header block, iff this record's WARC
    /// `Content-Type` names `application/http` and the content block splits
    /// cleanly at its first blank line.
    pub fn get_http_header_block(&self) -> Result<Option<Vec<u8>>, WARCError> {
        if !self.is_http_message() {
            return Ok(None);
        }
        let Some(content_block) = &self.content_block else {
            return Ok(None);
        };
        let bytes = content_block.bytes()?;
        let (header, _body) = crate::http::body::split_header_and_body(&bytes)
            .map(|(h, b)| (h.to_vec(), b.to_vec()))
            .map_err(|_| WARCError::MalformedHeader {
                offset: content_block.start(),
                source: None,
            })?;
        Ok(Some(header))
    }

    /// Returns the captured HTTP body block (still wire-encoded), iff this
    /// record's WARC `Content-Type` names `application/http`.
    pub fn get_http_body_block(&self) -> Result<Option<Vec<u8>>, WARCError> {
        if !self.is_http_message() {
            return Ok(None);
        }
        let Some(content_block) = &self.content_block else {
            return Ok(None);
        };
        let bytes = content_block.bytes()?;
        let (_header, body) = crate::http::body::split_header_and_body(&bytes)
            .map_err(|_| WARCError::MalformedHeader {
                offset: content_block.start(),
                source: None,
            })?;
        Ok(Some(body.to_vec()))
    }

    /// Returns the captured HTTP body, de-chunked and with any
    /// `Content-Encoding` codecs reversed.
    pub fn get_decompressed_http_body(&self) -> Result<Option<Vec<u8>>, WARCError> {
        if !self.is_http_message() {
            return Ok(None);
        }
        let Some(content_block) = &self.content_block else {
            return Ok(None);
        };
        let bytes = content_block.bytes()?;
        let (header, body) = crate::http::body::split_header_and_body(&bytes)?;
        let fields = crate::http::body::parse_header_fields(header)?;
        let mut decoded = Vec::new();
        crate::http::body::get_decompressed_http_body(body, &fields)?
            .read_to_end(&mut decoded)
            .map_err(WARCError::from)?;
        Ok(Some(decoded))
    }

    fn is_http_message(&self) -> bool {
        self.warc_field("Content-Type")
            .map(|v| {
                v.split(';')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .eq_ignore_ascii_case("application/http")
            })
            .unwrap_or(false)
    }
}

/// One independently-decompressible gzip member in a record-at-a-time
/// archive.
pub struct GzippedMember<S> {
    compressed_start: u64,
    compressed_end: u64,
    uncompressed_start: u64,
    uncompressed_end: u64,
    warc_record: Option<Record<S>>,
    non_warc_data: Option<Vec<u8>>,
}

impl<S: Read + Seek> GzippedMember<S> {
    /// Creates a `GzippedMember` describing one member's offsets.
    pub fn new(
        compressed_start: u64,
        compressed_end: u64,
        uncompressed_start: u64,
        uncompressed_end: u64,
    ) -> Self {
        Self {
            compressed_start,
            compressed_end,
            uncompressed_start,
            uncompressed_end,
            warc_record: None,
            non_warc_data: None,
        }
    }

    /// Offset of the first byte of this member in the compressed stream.
    pub fn compressed_start(&self) -> u64 {
        self.compressed_start
    }

    /// Offset one past this member's footer in the compressed stream.
    pub fn compressed_end(&self) -> u64 {
        self.compressed_end
    }

    /// Offset of this member's first decompressed byte in the virtual
    /// fully-decompressed stream.
    pub fn uncompressed_start(&self) -> u64 {
        self.uncompressed_start
    }

    /// Offset one past this member's last decompressed byte.
    pub fn uncompressed_end(&self) -> u64 {
        self.uncompressed_end
    }

    /// The WARC record decoded from this member's decompressed bytes, if
    /// any.
    pub fn warc_record(&self) -> Option<&Record<S>> {
        self.warc_record.as_ref()
    }

    /// Sets the WARC record decoded from this member.
    pub fn set_warc_record(&mut self, record: Record<S>) {
        self.warc_record = Some(record);
    }

    /// Takes ownership of the decoded WARC record, if any.
    pub fn take_warc_record(&mut self) -> Option<Record<S>> {
        self.warc_record.take()
    }

    /// Raw decompressed bytes, when this member didn't decode as a WARC
    /// record.
    pub fn non_warc_data(&self) -> Option<&[u8]> {
        self.non_warc_data.as_deref()
    }

    /// Sets the raw decompressed bytes for a non-WARC member.
    pub fn set_non_warc_data(&mut self, data: Vec<u8>) {
        self.non_warc_data = Some(data);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_parse_bytes_into_fields() {
        let map = parse_bytes_into_fields(b"WARC-Type: resource\r\nContent-Length: 10\r\n");
        assert_eq!(map.get_str("WARC-Type"), Some("resource"));
        assert_eq!(map.get_str("Content-Length"), Some("10"));
    }

    #[test]
    fn test_parse_bytes_into_fields_no_colon() {
        let map = parse_bytes_into_fields(b"garbage line\r\n");
        assert!(map.contains_key("garbage line"));
    }

    #[test]
    fn test_range_data_owned_bytes() {
        let range: RangeData<Cursor<Vec<u8>>> = RangeData::with_owned(0, 3, b"abc".to_vec());
        assert_eq!(&*range.bytes().unwrap(), b"abc");
    }

    #[test]
    fn test_range_data_no_source_errors() {
        let range: RangeData<Cursor<Vec<u8>>> = RangeData::new(0, 3);
        assert!(range.bytes().is_err());
    }

    #[test]
    fn test_range_data_stream_bytes() {
        let handle: StreamHandle<Cursor<Vec<u8>>> =
            Rc::new(RefCell::new(Cursor::new(b"0123456789".to_vec())));
        let range = RangeData::with_stream(2, 5, handle.clone());
        assert_eq!(&*range.bytes().unwrap(), b"234");
        // cursor position must be restored
        assert_eq!(handle.borrow_mut().stream_position().unwrap(), 0);
    }

    #[test]
    fn test_range_chunks_memory() {
        let range: RangeData<Cursor<Vec<u8>>> =
            RangeData::with_owned(0, 5, b"abcde".to_vec());
        let chunks: Vec<Vec<u8>> = range
            .iterator(2)
            .collect::<std::io::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(chunks, vec![b"ab".to_vec(), b"cd".to_vec(), b"e".to_vec()]);
    }

    #[test]
    fn test_check_content_length() {
        let header_range: RangeData<Cursor<Vec<u8>>> =
            RangeData::with_owned(0, 0, b"Content-Length: 3\r\n".to_vec());
        let header = Header::new(header_range, true);
        let content_block = ContentBlock::new(RangeData::with_owned(0, 0, b"abc".to_vec()));
        let record_range: RangeData<Cursor<Vec<u8>>> = RangeData::new(0, 0);
        let mut record = Record::new(record_range, Some(header), Some(content_block));

        assert!(record.check_content_length());
    }
}
