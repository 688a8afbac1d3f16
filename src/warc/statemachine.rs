//! The shared state-machine driver and the two record-extraction
//! strategies that plug into it.

use std::{
    cell::RefCell,
    io::{Read, Seek, SeekFrom},
    rc::Rc,
};

use super::{
    config::{CachingConfig, ParsingConfig, ParsingStyle},
    filters::{ParseOutcome, ProcessorConfig},
    model::{ContentBlock, Header, RangeData, Record, StreamHandle, UnparsableLine},
    WARCError,
};
use crate::warc::primitives;

/// States of the shared parser state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    FindWarcHeader,
    ExtractNextRecord,
    CheckRecordAgainstFilters,
    RunRecordHandlers,
    YieldCurrentRecord,
    FindNextRecord,
    RunParserCallbacks,
    End,
}

/// Drives extraction of WARC records from a seekable, uncompressed byte
/// stream using either the delimiter or content-length strategy.
pub struct WarcRecordParser<S: Read + Seek> {
    stream: StreamHandle<S>,
    parsing: ParsingConfig,
    caching: CachingConfig,
    processor: ProcessorConfig<S>,
    state: ParserState,
    current_record: Option<Record<S>>,
    records_yielded: u64,
    unparsable_line_count: u64,
    warnings: Vec<String>,
    error: Option<String>,
    callbacks_run: bool,
}

impl<S: Read + Seek> WarcRecordParser<S> {
    /// Creates a parser over `stream` with the given configuration.
    ///
    /// `parsing` must already have passed [ParsingConfig::validate].
    pub fn new(stream: S, parsing: ParsingConfig, caching: CachingConfig, processor: ProcessorConfig<S>) -> Self {
        Self {
            stream: Rc::new(RefCell::new(stream)),
            parsing,
            caching,
            processor,
            state: ParserState::FindWarcHeader,
            current_record: None,
            records_yielded: 0,
            unparsable_line_count: 0,
            warnings: Vec::new(),
            error: None,
            callbacks_run: false,
        }
    }

    /// Non-fatal warnings collected so far.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The fatal error that ended the parse, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    fn tell(&self) -> std::io::Result<u64> {
        self.stream.borrow_mut().stream_position()
    }

    fn run_callbacks_and_end(&mut self) {
        if !self.callbacks_run {
            let outcome = ParseOutcome {
                records_yielded: self.records_yielded,
                unparsable_lines: self.unparsable_line_count,
                error: self.error.clone(),
                warnings: self.warnings.clone(),
            };

            for callback in &mut self.processor.parser_callbacks {
                // Callback errors are not fatal to shutdown; log and move on.
                if let Err(error) = callback.call(&outcome) {
                    tracing::warn!(%error, "parser callback failed");
                }
            }

            self.callbacks_run = true;
        }

        self.state = ParserState::End;
    }

    fn step(&mut self) -> Option<Result<Record<S>, WARCError>> {
        loop {
            match self.state {
                ParserState::FindWarcHeader => {
                    if let Err(error) = self.find_warc_header() {
                        return Some(Err(error));
                    }
                }
                ParserState::ExtractNextRecord => match self.extract_next_record() {
                    Ok(true) => self.state = ParserState::CheckRecordAgainstFilters,
                    Ok(false) => self.state = ParserState::FindNextRecord,
                    Err(error) => return Some(Err(error)),
                },
                ParserState::CheckRecordAgainstFilters => {
                    let record = self.current_record.as_ref().unwrap();
                    let mut accepted = true;

                    for filter in &self.processor.record_filters {
                        match filter.accept(record) {
                            Ok(true) => {}
                            Ok(false) => {
                                accepted = false;
                                break;
                            }
                            Err(error) => return Some(Err(error)),
                        }
                    }

                    self.state = if accepted {
                        ParserState::RunRecordHandlers
                    } else {
                        self.current_record = None;
                        ParserState::FindNextRecord
                    };
                }
                ParserState::RunRecordHandlers => {
                    let record = self.current_record.as_ref().unwrap();

                    for handler in &mut self.processor.record_handlers {
                        if let Err(error) = handler.handle(record) {
                            return Some(Err(error));
                        }
                    }

                    self.state = ParserState::YieldCurrentRecord;
                }
                ParserState::YieldCurrentRecord => {
                    let record = self.current_record.take().unwrap();
                    self.records_yielded += 1;

                    self.state = match self.parsing.stop_after_nth {
                        Some(n) if self.records_yielded >= n => ParserState::RunParserCallbacks,
                        _ => ParserState::FindNextRecord,
                    };

                    return Some(Ok(record));
                }
                ParserState::FindNextRecord => match self.find_next_record() {
                    Ok(true) => self.state = ParserState::ExtractNextRecord,
                    Ok(false) => self.state = ParserState::RunParserCallbacks,
                    Err(error) => return Some(Err(error)),
                },
                ParserState::RunParserCallbacks => {
                    self.run_callbacks_and_end();
                }
                ParserState::End => return None,
            }
        }
    }

    fn find_warc_header(&mut self) -> Result<(), WARCError> {
        {
            let mut stream = self.stream.borrow_mut();
            primitives::skip_leading_whitespace(&mut ComboPeek::new(&mut *stream))?;
        }

        if self.peek_is_warc_version()? {
            self.state = ParserState::ExtractNextRecord;
            Ok(())
        } else {
            self.error = Some("No WARC header found.".to_string());
            self.run_callbacks_and_end();
            Ok(())
        }
    }

    fn peek_is_warc_version(&mut self) -> Result<bool, WARCError> {
        let mut stream = self.stream.borrow_mut();
        let start = stream.stream_position()?;
        let mut buf = [0u8; 9];
        let amount = read_best_effort(&mut *stream, &mut buf)?;
        stream.seek(SeekFrom::Start(start))?;

        Ok(buf[..amount].starts_with(b"WARC/1.0") || buf[..amount].starts_with(b"WARC/1.1"))
    }

    fn find_next_record(&mut self) -> Result<bool, WARCError> {
        loop {
            if self.peek_is_warc_version()? {
                return Ok(true);
            }

            let start = self.tell()?;
            let ending = {
                let mut stream = self.stream.borrow_mut();
                primitives::advance_to_next_line(&mut *stream, self.parsing.parsing_chunk_size.max(2))?
            };

            if ending.is_none() {
                return Ok(false);
            }

            let end = self.tell()?;

            if end == start {
                // Zero-length read; avoid spinning forever on a pathological stream.
                return Ok(false);
            }

            self.emit_unparsable_line(start, end)?;
        }
    }

    fn emit_unparsable_line(&mut self, start: u64, end: u64) -> Result<(), WARCError> {
        self.unparsable_line_count += 1;

        if self.caching.unparsable_lines {
            let range = if self.caching.unparsable_line_bytes {
                let mut stream = self.stream.borrow_mut();
                stream.seek(SeekFrom::Start(start))?;
                let mut buf = vec![0u8; (end - start) as usize];
                stream.read_exact(&mut buf)?;
                RangeData::with_owned(start, end, buf)
            } else {
                RangeData::with_stream(start, end, self.stream.clone())
            };

            let line = UnparsableLine::new(range);

            for handler in &mut self.processor.unparsable_line_handlers {
                handler.handle(&line)?;
            }
        }

        Ok(())
    }

    fn extract_next_record(&mut self) -> Result<bool, WARCError> {
        match self.parsing.style {
            ParsingStyle::Delimiter => self.extract_next_record_delimiter(),
            ParsingStyle::ContentLength => self.extract_next_record_content_length(),
        }
    }

    fn build_range(&self, start: u64, end: u64, cache: bool) -> Result<RangeData<S>, WARCError> {
        let lazy = self.parsing.enable_lazy_loading_of_bytes;

        if cache {
            let mut stream = self.stream.borrow_mut();
            stream.seek(SeekFrom::Start(start))?;
            let mut buf = vec![0u8; (end - start) as usize];
            stream.read_exact(&mut buf)?;

            Ok(if lazy {
                RangeData::with_both(start, end, buf, self.stream.clone())
            } else {
                RangeData::with_owned(start, end, buf)
            })
        } else if lazy {
            Ok(RangeData::with_stream(start, end, self.stream.clone()))
        } else {
            Ok(RangeData::new(start, end))
        }
    }

    fn extract_next_record_delimiter(&mut self) -> Result<bool, WARCError> {
        let start = self.tell()?;
        let chunk_size = self.parsing.parsing_chunk_size;

        let delimiter_end = {
            let mut stream = self.stream.borrow_mut();
            primitives::find_next_delimiter(&mut *stream, chunk_size)?
        };

        let end = match delimiter_end {
            Some(offset) => offset - 4,
            None => {
                self.warn(format!("record starting at {start} is possibly truncated (no terminator found)"));
                let mut stream = self.stream.borrow_mut();
                stream.seek(SeekFrom::End(0))?
            }
        };

        let record_range = self.build_range(start, end, self.caching.record_bytes)?;

        let (header, content_block) = if self.parsing.split_records {
            self.split_delimiter_record(start, end)?
        } else {
            (None, None)
        };

        {
            let mut stream = self.stream.borrow_mut();
            stream.seek(SeekFrom::Start(delimiter_end.unwrap_or(end)))?;
        }

        let mut record = Record::new(record_range, header, content_block);

        if self.parsing.check_content_lengths {
            record.check_content_length();
        }

        self.current_record = Some(record);
        Ok(true)
    }

    fn split_delimiter_record(
        &mut self,
        start: u64,
        end: u64,
    ) -> Result<(Option<Header<S>>, Option<ContentBlock<S>>), WARCError> {
        let chunk_size = self.parsing.parsing_chunk_size;

        {
            let mut stream = self.stream.borrow_mut();
            stream.seek(SeekFrom::Start(start))?;
        }

        let header_end = {
            let mut stream = self.stream.borrow_mut();
            primitives::find_next_header_end(&mut *stream, chunk_size)?
        };

        let Some(header_end) = header_end.filter(|&h| h <= end) else {
            self.warn(format!("record at {start} could not be split into header/content sections"));
            return Ok((None, None));
        };

        let header_range = self.build_range(start, header_end, self.caching.header_bytes)?;
        let header = Header::new(header_range, self.caching.parsed_headers);

        let content_range = self.build_range(header_end, end, self.caching.content_block_bytes)?;
        let content_block = ContentBlock::new(content_range);

        Ok((Some(header), Some(content_block)))
    }

    fn extract_next_record_content_length(&mut self) -> Result<bool, WARCError> {
        let chunk_size = self.parsing.parsing_chunk_size;
        let header_start = self.tell()?;

        let header_end = {
            let mut stream = self.stream.borrow_mut();
            primitives::find_next_header_end(&mut *stream, chunk_size)?
        };

        let header_end = match header_end {
            Some(offset) => offset,
            None => {
                let mut stream = self.stream.borrow_mut();
                stream.seek(SeekFrom::End(0))?
            }
        };

        let header_bytes = {
            let mut stream = self.stream.borrow_mut();
            stream.seek(SeekFrom::Start(header_start))?;
            let mut buf = vec![0u8; (header_end - header_start) as usize];
            stream.read_exact(&mut buf)?;
            buf
        };

        let content_length = match primitives::find_content_length_in_bytes(&header_bytes) {
            Some(length) => length,
            None => {
                // Not a usable WARC record under this strategy; surface the
                // whole header block as unparsable and resume scanning past
                // it rather than re-examining the same bytes forever.
                self.emit_unparsable_line(header_start, header_end)?;
                let mut stream = self.stream.borrow_mut();
                stream.seek(SeekFrom::Start(header_end))?;
                return Ok(false);
            }
        };

        let content_start = header_end;
        let content_end = content_start + content_length;

        let header_range = if self.parsing.split_records {
            self.build_range_from_bytes(header_start, header_end, header_bytes.clone(), self.caching.header_bytes)
        } else {
            None
        };

        {
            let mut stream = self.stream.borrow_mut();
            stream.seek(SeekFrom::Start(content_start))?;
        }
        let content_range = self.build_range(content_start, content_end, self.caching.content_block_bytes)?;

        {
            let mut stream = self.stream.borrow_mut();
            stream.seek(SeekFrom::Start(content_end))?;

            let mut terminator = [0u8; 4];
            let amount = read_best_effort(&mut *stream, &mut terminator)?;

            if &terminator[..amount] != b"\r\n\r\n" {
                self.warnings.push(format!(
                    "record ending at {content_end} missing expected CRLF CRLF terminator"
                ));
                stream.seek(SeekFrom::Start(content_end))?;
            }
        }

        let record_range = self.build_range(header_start, content_end, self.caching.record_bytes)?;

        let header = header_range.map(|range| Header::new(range, self.caching.parsed_headers));
        let content_block = if self.parsing.split_records {
            Some(ContentBlock::new(content_range))
        } else {
            None
        };

        let record = Record::new(record_range, header, content_block);

        self.current_record = Some(record);
        Ok(true)
    }

    fn build_range_from_bytes(
        &self,
        start: u64,
        end: u64,
        bytes: Vec<u8>,
        cache: bool,
    ) -> Option<RangeData<S>> {
        if !cache && !self.parsing.enable_lazy_loading_of_bytes {
            return Some(RangeData::new(start, end));
        }

        Some(if self.parsing.enable_lazy_loading_of_bytes {
            RangeData::with_both(start, end, bytes, self.stream.clone())
        } else {
            RangeData::with_owned(start, end, bytes)
        })
    }
}

impl<S: Read + Seek> Iterator for WarcRecordParser<S> {
    type Item = Result<Record<S>, WARCError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step()
    }
}

fn read_best_effort<R: Read>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match stream.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
    Ok(total)
}

/// Adapter exposing a `&mut S` (where `S: Read + Seek`) through
/// [crate::io::PeekRead], backed by a 1-byte lookahead buffer, for the
/// benefit of [primitives::skip_leading_whitespace].
struct ComboPeek<'a, S: Read + Seek> {
    stream: &'a mut S,
    lookahead: Option<u8>,
}

impl<'a, S: Read + Seek> ComboPeek<'a, S> {
    fn new(stream: &'a mut S) -> Self {
        Self {
            stream,
            lookahead: None,
        }
    }
}

impl<'a, S: Read + Seek> Read for ComboPeek<'a, S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if let Some(byte) = self.lookahead.take() {
            if buf.is_empty() {
                self.lookahead = Some(byte);
                return Ok(0);
            }
            buf[0] = byte;
            return Ok(1);
        }
        self.stream.read(buf)
    }
}

impl<'a, S: Read + Seek> ComboPeek<'a, S> {
    /// The logical position, accounting for a byte already buffered as
    /// lookahead past the real stream cursor.
    fn logical_position(&mut self) -> std::io::Result<u64> {
        let pos = self.stream.stream_position()?;
        Ok(if self.lookahead.is_some() { pos - 1 } else { pos })
    }
}

impl<'a, S: Read + Seek> Seek for ComboPeek<'a, S> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n,
            SeekFrom::Current(delta) => {
                let cur = self.logical_position()? as i64;
                (cur + delta) as u64
            }
            SeekFrom::End(delta) => {
                self.lookahead = None;
                return self.stream.seek(SeekFrom::End(delta));
            }
        };

        self.lookahead = None;
        self.stream.seek(SeekFrom::Start(target))
    }
}

impl<'a, S: Read + Seek> crate::io::PeekRead for ComboPeek<'a, S> {
    fn peek(&mut self, amount: usize) -> std::io::Result<&[u8]> {
        debug_assert!(amount <= 1, "only single-byte lookahead is supported here");

        if self.lookahead.is_none() {
            let mut buf = [0u8; 1];
            let n = read_best_effort(self.stream, &mut buf)?;
            if n == 1 {
                self.lookahead = Some(buf[0]);
            }
        }

        Ok(match &self.lookahead {
            Some(byte) => std::slice::from_ref(byte),
            None => &[],
        })
    }
}
