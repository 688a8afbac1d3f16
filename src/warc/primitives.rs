//! Byte-stream scanning primitives shared by both WARC parsing strategies.
//!
//! These operate on any seekable, peekable stream and are careful to restore
//! the cursor on every exit path unless documented otherwise.

use std::io::{Read, Seek, SeekFrom};

use regex::bytes::Regex;

use crate::io::PeekRead;

/// Runs `body` with the stream's cursor saved, restoring it afterward
/// regardless of the outcome.
///
/// This is the scoped cursor-preservation helper used by every read-only
/// scan in this module: a scan should never have an observable side effect
/// on the stream position, even when it returns an error.
pub fn with_restored_position<S, F, T>(stream: &mut S, body: F) -> std::io::Result<T>
where
    S: Seek,
    F: FnOnce(&mut S) -> std::io::Result<T>,
{
    let saved = stream.stream_position()?;
    let result = body(stream);
    stream.seek(SeekFrom::Start(saved))?;
    result
}

/// Advances the stream past any leading whitespace bytes.
///
/// Leaves the cursor positioned on the first non-whitespace byte, or at EOF
/// if the stream is exhausted.
pub fn skip_leading_whitespace<S>(stream: &mut S) -> std::io::Result<()>
where
    S: Read + Seek + PeekRead,
{
    loop {
        let buffer = stream.peek(1)?;

        if buffer.is_empty() || !buffer[0].is_ascii_whitespace() {
            return Ok(());
        }

        stream.seek(SeekFrom::Current(1))?;
    }
}

/// Result of scanning past one line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEnding {
    /// Whether the line ended with `\r\n` rather than a bare `\n`.
    pub ended_with_crlf: bool,
    /// Whether the line consisted solely of the terminator (an empty line).
    pub was_crlf_only: bool,
}

/// Advances the cursor to just past the next `\n` byte.
///
/// `chunk_size` must be at least 2 so that a `\r\n` pair straddling a chunk
/// boundary can still be detected. Returns `None` at EOF with no terminator
/// found; in that case the cursor is left at EOF.
pub fn advance_to_next_line<S>(
    stream: &mut S,
    chunk_size: usize,
) -> std::io::Result<Option<LineEnding>>
where
    S: Read + Seek,
{
    assert!(chunk_size >= 2, "chunk_size must be at least 2");

    let line_start = stream.stream_position()?;
    let mut buf = vec![0u8; chunk_size];
    let mut prev_byte: Option<u8> = None;
    let mut bytes_before_newline = 0u64;

    loop {
        let amount = stream.read(&mut buf)?;

        if amount == 0 {
            return Ok(None);
        }

        if let Some(pos) = buf[..amount].iter().position(|&b| b == b'\n') {
            let newline_offset = line_start + bytes_before_newline + pos as u64;
            stream.seek(SeekFrom::Start(newline_offset + 1))?;

            let ended_with_crlf = if pos > 0 {
                buf[pos - 1] == b'\r'
            } else {
                prev_byte == Some(b'\r')
            };
            let was_crlf_only = ended_with_crlf
                && newline_offset.saturating_sub(line_start) == 1;

            return Ok(Some(LineEnding {
                ended_with_crlf,
                was_crlf_only,
            }));
        }

        bytes_before_newline += amount as u64;
        prev_byte = Some(buf[amount - 1]);
    }
}

/// Searches (without moving the cursor) for the WARC record terminator
/// `CRLF CRLF`, confirmed by either not being followed by another `CRLF` or
/// being followed by a recognized WARC version line.
///
/// Returns the offset of the first byte past the terminator, relative to the
/// stream's start, or `None` if no delimiter was found before EOF.
///
/// Embedded `CRLF CRLF` sequences inside a content block may cause a false
/// positive here; callers who cannot tolerate that should use the
/// content-length strategy instead.
pub fn find_next_delimiter<S>(stream: &mut S, chunk_size: usize) -> std::io::Result<Option<u64>>
where
    S: Read + Seek,
{
    with_restored_position(stream, |stream| {
        let start = stream.stream_position()?;
        let mut window = Vec::new();
        let mut buf = vec![0u8; chunk_size.max(4)];
        let mut search_from = 0usize;

        loop {
            while let Some(pos) = find_subsequence(&window[search_from..], b"\r\n\r\n") {
                let pos = search_from + pos;
                let terminator_end = pos + 4;

                // Need up to 9 bytes of lookahead to recognize a version
                // line; top up the window before judging this candidate.
                while window.len() < terminator_end + 9 {
                    let amount = stream.read(&mut buf)?;
                    if amount == 0 {
                        break;
                    }
                    window.extend_from_slice(&buf[..amount]);
                }

                let lookahead = &window[terminator_end..];
                let is_confirmed = !lookahead.starts_with(b"\r\n")
                    || lookahead.starts_with(b"WARC/1.0\r\n")
                    || lookahead.starts_with(b"WARC/1.1\r\n");

                if is_confirmed {
                    return Ok(Some(start + terminator_end as u64));
                }

                search_from = pos + 1;
            }

            let amount = stream.read(&mut buf)?;

            if amount == 0 {
                return Ok(None);
            }

            window.extend_from_slice(&buf[..amount]);
        }
    })
}

/// Searches (without moving the cursor) for a `CRLF`-only line, the boundary
/// between a record's header block and its content block.
///
/// Returns the offset just past the boundary line, relative to the stream's
/// start, or `None` if not found before EOF.
pub fn find_next_header_end<S>(stream: &mut S, chunk_size: usize) -> std::io::Result<Option<u64>>
where
    S: Read + Seek,
{
    with_restored_position(stream, |stream| {
        let start = stream.stream_position()?;
        let mut window = Vec::new();
        let mut buf = vec![0u8; chunk_size.max(2)];
        let mut dropped: u64 = 0;

        loop {
            let amount = stream.read(&mut buf)?;

            if amount == 0 {
                return Ok(None);
            }

            window.extend_from_slice(&buf[..amount]);

            if let Some(pos) = find_subsequence(&window, b"\r\n\r\n") {
                return Ok(Some(start + dropped + pos as u64 + 4));
            }
            if let Some(pos) = find_subsequence(&window, b"\n\n") {
                return Ok(Some(start + dropped + pos as u64 + 2));
            }

            if window.len() > chunk_size * 4 {
                let drop = window.len() - 4;
                window.drain(0..drop);
                dropped += drop as u64;
            }
        }
    })
}

/// Finds the value of a `Content-Length` field within raw header bytes.
///
/// Matching is case-insensitive on the field name; the value is parsed as a
/// base-10 integer, ignoring surrounding whitespace.
pub fn find_content_length_in_bytes(data: &[u8]) -> Option<u64> {
    lazy_static::lazy_static! {
        static ref CONTENT_LENGTH_RE: Regex =
            Regex::new(r"(?i)content-length:[ \t]*([0-9]+)").unwrap();
    }

    let captures = CONTENT_LENGTH_RE.captures(data)?;
    let digits = captures.get(1)?;
    std::str::from_utf8(digits.as_bytes())
        .ok()?
        .parse::<u64>()
        .ok()
}

/// Returns whether `pattern` occurs in `data`.
pub fn pattern_in_bytes(data: &[u8], pattern: &Regex) -> bool {
    pattern.is_match(data)
}

/// Returns whether the literal byte string `target` occurs in `data`.
pub fn target_in_bytes(data: &[u8], target: &[u8]) -> bool {
    find_subsequence(data, target).is_some()
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_skip_leading_whitespace() {
        let mut stream = Cursor::new(b"  \t\r\nWARC/1.0\r\n".to_vec());
        skip_leading_whitespace(&mut stream).unwrap();
        assert_eq!(stream.stream_position().unwrap(), 4);
    }

    #[test]
    fn test_advance_to_next_line() {
        let mut stream = Cursor::new(b"abc\r\ndef".to_vec());
        let ending = advance_to_next_line(&mut stream, 4).unwrap().unwrap();
        assert!(ending.ended_with_crlf);
        assert!(!ending.was_crlf_only);
        assert_eq!(stream.stream_position().unwrap(), 5);
    }

    #[test]
    fn test_advance_to_next_line_empty() {
        let mut stream = Cursor::new(b"\r\ndef".to_vec());
        let ending = advance_to_next_line(&mut stream, 4).unwrap().unwrap();
        assert!(ending.ended_with_crlf);
        assert!(ending.was_crlf_only);
    }

    #[test]
    fn test_advance_to_next_line_eof() {
        let mut stream = Cursor::new(b"abc".to_vec());
        let result = advance_to_next_line(&mut stream, 4).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_find_next_delimiter() {
        let mut stream =
            Cursor::new(b"WARC/1.0\r\nk: v\r\n\r\ncontent\r\n\r\nWARC/1.0\r\n".to_vec());
        let offset = find_next_delimiter(&mut stream, 8).unwrap().unwrap();
        assert_eq!(&stream.get_ref()[..offset as usize], b"WARC/1.0\r\nk: v\r\n\r\ncontent\r\n\r\n");
        assert_eq!(stream.stream_position().unwrap(), 0);
    }

    #[test]
    fn test_find_next_header_end() {
        let mut stream = Cursor::new(b"k: v\r\nk2: v2\r\n\r\ncontent".to_vec());
        let offset = find_next_header_end(&mut stream, 8).unwrap().unwrap();
        assert_eq!(offset, 16);
    }

    #[test]
    fn test_find_content_length_in_bytes() {
        assert_eq!(
            find_content_length_in_bytes(b"WARC-Type: resource\r\nContent-Length: 42\r\n"),
            Some(42)
        );
        assert_eq!(find_content_length_in_bytes(b"WARC-Type: resource\r\n"), None);
    }

    #[test]
    fn test_target_in_bytes() {
        assert!(target_in_bytes(b"hello world", b"wor"));
        assert!(!target_in_bytes(b"hello world", b"xyz"));
    }
}
