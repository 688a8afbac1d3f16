//! Splitting and content-decoding of an HTTP message captured in a record.
//!
//! A WARC `response`/`request` record with media type `application/http`
//! stores a complete captured HTTP message (start line, header fields, and
//! body) as its content block. This module splits that block into its
//! header and body parts and, for the body, reverses whatever the origin
//! server did to it: de-chunking a `Transfer-Encoding: chunked` body and
//! then running the `Content-Encoding` codecs in reverse order.

use std::io::{Cursor, Read};

use crate::{
    compress::{CompressionFormat, Decompressor},
    header::{HeaderMap, HeaderParser},
};

use super::{chunked::ChunkedReader, HTTPError};

/// Splits a captured HTTP message into its header block and body block.
///
/// `content` is the full content block of a record whose media type is
/// `application/http`, including the request or status line. The returned
/// header slice spans from the start of `content` up to and including the
/// blank line boundary; the body slice is everything after it.
///
/// Returns an error if no header/body boundary is found.
pub fn split_header_and_body(content: &[u8]) -> Result<(&[u8], &[u8]), HTTPError> {
    let mut boundary = Vec::new();
    let mut cursor = Cursor::new(content);

    crate::header::read_until_boundary(&mut cursor, &mut boundary, content.len() as u64)
        .map_err(|_| HTTPError::UnexpectedEnd)?;

    let split_point = boundary.len();
    Ok((&content[..split_point], &content[split_point..]))
}

/// Parses the header block of a captured HTTP message.
///
/// The header block includes the request or status line as its first line;
/// that line is skipped and the remaining lines are parsed as fields.
pub fn parse_header_fields(header_block: &[u8]) -> Result<HeaderMap, HTTPError> {
    let start_line_end = header_block
        .iter()
        .position(|&byte| byte == b'\n')
        .map(|index| index + 1)
        .unwrap_or(0);

    HeaderParser::new()
        .parse_header(&header_block[start_line_end..])
        .map_err(|error| HTTPError::MalformedHeader {
            source: Some(Box::new(error)),
        })
}

fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Returns whether the message body is chunked, per `Transfer-Encoding`.
///
/// Per RFC 9112 section 6.1, when `Transfer-Encoding` is present, chunked
/// coding must be the last coding applied, so only the final token matters.
pub fn is_chunked(fields: &HeaderMap) -> bool {
    fields
        .get_all("Transfer-Encoding")
        .flat_map(|value| comma_list(&value.text))
        .last()
        .map(|coding| coding == "chunked")
        .unwrap_or(false)
}

/// Returns the `Content-Encoding` codecs applied to the body, in the order
/// they were applied (outermost codec last, as specified by HTTP).
pub fn content_codings(fields: &HeaderMap) -> Vec<CompressionFormat> {
    fields
        .get_all("Content-Encoding")
        .flat_map(|value| comma_list(&value.text))
        .filter(|coding| coding != "identity")
        .filter_map(|coding| match coding.parse::<CompressionFormat>() {
            Ok(format) => Some(format),
            Err(_) => {
                tracing::warn!(%coding, "unsupported content coding");
                None
            }
        })
        .collect()
}

/// Decodes a captured HTTP body: de-chunks it if needed, then reverses the
/// `Content-Encoding` codec stack.
///
/// The safest order, regardless of what codec combinations a server used, is
/// to always de-chunk before applying content-encoding decoders, since
/// chunked transfer coding is a property of the connection rather than the
/// resource representation.
pub fn get_decompressed_http_body<'a>(
    body: &'a [u8],
    fields: &HeaderMap,
) -> Result<Box<dyn Read + 'a>, HTTPError> {
    let mut reader: Box<dyn Read + 'a> = if is_chunked(fields) {
        Box::new(ChunkedReader::new(Cursor::new(body)))
    } else {
        Box::new(Cursor::new(body))
    };

    for format in content_codings(fields).into_iter().rev() {
        reader = Box::new(
            Decompressor::new_format(reader, format)
                .map_err(HTTPError::Io)?,
        );
    }

    Ok(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderMapExt as _;

    #[test]
    fn test_split_header_and_body() {
        let content = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello world";
        let (header, body) = split_header_and_body(content).unwrap();

        assert_eq!(
            header,
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n".as_slice()
        );
        assert_eq!(body, b"hello world");
    }

    #[test]
    fn test_parse_header_fields() {
        let header = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n";
        let fields = parse_header_fields(header).unwrap();

        assert_eq!(fields.get_str("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_content_codings_reverse_order() {
        let header = b"HTTP/1.1 200 OK\r\nContent-Encoding: br, gzip\r\n\r\n";
        let fields = parse_header_fields(header).unwrap();
        let codings = content_codings(&fields);

        assert_eq!(
            codings,
            vec![CompressionFormat::Brotli, CompressionFormat::Gzip]
        );
    }

    #[test]
    fn test_is_chunked() {
        let header = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\n\r\n";
        let fields = parse_header_fields(header).unwrap();

        assert!(is_chunked(&fields));
    }
}
