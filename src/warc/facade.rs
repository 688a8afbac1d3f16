//! Convenience entry points wiring configuration, filter/handler chains, and
//! a chosen parsing strategy into a single iterator-producing type.
//!
//! Grounded on the original `warcbench.WARCParser` convenience wrapper: a
//! caller should not need to assemble the state machine, the gzip member
//! locator, and the processor chains by hand.

use std::io::{Cursor, Read, Seek};

use super::{
    config::{CachingConfig, GzipCachingConfig, ParserSettings, ParsingConfig},
    filters::{GzipProcessorConfig, ProcessorConfig},
    gzip_locate::GzipMemberLocator,
    model::{GzippedMember, Record},
    statemachine::WarcRecordParser,
    WARCError,
};

/// Parses an uncompressed WARC stream record by record.
pub struct WARCParser<S: Read + Seek> {
    inner: WarcRecordParser<S>,
}

impl<S: Read + Seek> WARCParser<S> {
    /// Creates a parser over `stream`, validating `settings` first.
    pub fn new(
        stream: S,
        settings: &ParserSettings,
        processor: ProcessorConfig<S>,
    ) -> Result<Self, super::ConfigError> {
        settings.validate()?;
        Ok(Self {
            inner: WarcRecordParser::new(
                stream,
                settings.parsing.clone(),
                settings.caching.clone(),
                processor,
            ),
        })
    }

    /// Creates a parser from already-validated configuration parts.
    pub fn from_parts(
        stream: S,
        parsing: ParsingConfig,
        caching: CachingConfig,
        processor: ProcessorConfig<S>,
    ) -> Self {
        Self {
            inner: WarcRecordParser::new(stream, parsing, caching, processor),
        }
    }

    /// Returns an iterator over the stream's records.
    pub fn records(&mut self) -> RecordIter<'_, S> {
        RecordIter(&mut self.inner)
    }

    /// Parses every record into memory and returns them all at once.
    pub fn parse_all(&mut self) -> Result<Vec<Record<S>>, WARCError> {
        self.records().collect()
    }

    /// Non-fatal warnings collected so far.
    pub fn warnings(&self) -> &[String] {
        self.inner.warnings()
    }

    /// The fatal error that ended the parse, if any.
    pub fn error(&self) -> Option<&str> {
        self.inner.error()
    }
}

/// Iterator over the records of a [WARCParser].
pub struct RecordIter<'a, S: Read + Seek>(&'a mut WarcRecordParser<S>);

impl<'a, S: Read + Seek> Iterator for RecordIter<'a, S> {
    type Item = Result<Record<S>, WARCError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

/// Parses a record-at-a-time gzip WARC stream (`.warc.gz`) member by member.
///
/// Each gzip member is expected to decompress to exactly one WARC record, by
/// the usual web-archiving convention; a member that doesn't is reported via
/// [GzippedMember::non_warc_data] rather than failing the whole parse.
pub struct GzipWARCParser<R: Read> {
    locator: GzipMemberLocator<R>,
    parsing: ParsingConfig,
    caching: GzipCachingConfig,
    processor: GzipProcessorConfig<Cursor<Vec<u8>>>,
    warnings: Vec<String>,
    error: Option<String>,
}

impl<R: Read> GzipWARCParser<R> {
    /// Creates a parser over the compressed `stream`, validating `settings`
    /// first.
    pub fn new(
        stream: R,
        settings: &ParserSettings,
        caching: GzipCachingConfig,
        processor: GzipProcessorConfig<Cursor<Vec<u8>>>,
    ) -> Result<Self, super::ConfigError> {
        settings.validate()?;
        Ok(Self {
            locator: GzipMemberLocator::new(stream),
            parsing: settings.parsing.clone(),
            caching,
            processor,
            warnings: Vec::new(),
            error: None,
        })
    }

    /// Returns an iterator over located gzip members, each carrying its
    /// decoded WARC record when one was found.
    pub fn members(&mut self) -> MemberIter<'_, R> {
        MemberIter(self)
    }

    /// Returns an iterator over just the WARC records decoded from members,
    /// skipping members that didn't decode as one.
    pub fn records(&mut self) -> impl Iterator<Item = Result<Record<Cursor<Vec<u8>>>, WARCError>> + '_ {
        self.members().filter_map(|result| match result {
            Ok(mut member) => member.take_warc_record().map(Ok),
            Err(error) => Some(Err(error)),
        })
    }

    /// Non-fatal warnings collected so far.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The fatal error that ended the parse, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn next_member(&mut self) -> Option<Result<GzippedMember<Cursor<Vec<u8>>>, WARCError>> {
        loop {
            let outcome = self.locator.next_member();

            let (location, bytes) = match outcome {
                Ok(Some(pair)) => pair,
                Ok(None) => return None,
                Err(error) => {
                    self.error = Some(error.to_string());
                    return Some(Err(WARCError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        error,
                    ))));
                }
            };

            let mut member = GzippedMember::new(
                location.compressed_start,
                location.compressed_end,
                location.uncompressed_start,
                location.uncompressed_end,
            );

            let mut accepted = true;
            for filter in &self.processor.member_filters {
                match filter.accept(&member) {
                    Ok(true) => {}
                    Ok(false) => {
                        accepted = false;
                        break;
                    }
                    Err(error) => return Some(Err(error)),
                }
            }
            if !accepted {
                continue;
            }

            let mut record_caching = self.caching.record.clone();
            if self.caching.member_uncompressed_bytes {
                record_caching.record_bytes = true;
            }

            let raw_copy = if self.caching.non_warc_member_bytes {
                Some(bytes.clone())
            } else {
                None
            };

            let cursor = Cursor::new(bytes);
            let mut inner =
                WarcRecordParser::new(cursor, self.parsing.clone(), record_caching, ProcessorConfig::new());

            match inner.next() {
                Some(Ok(record)) => member.set_warc_record(record),
                Some(Err(error)) => return Some(Err(error)),
                None => {
                    if let Some(raw) = raw_copy {
                        member.set_non_warc_data(raw);
                    }
                }
            }

            for handler in &mut self.processor.member_handlers {
                if let Err(error) = handler.handle(&member) {
                    return Some(Err(error));
                }
            }

            return Some(Ok(member));
        }
    }
}

/// Iterator over the gzip members of a [GzipWARCParser].
pub struct MemberIter<'a, R: Read>(&'a mut GzipWARCParser<R>);

impl<'a, R: Read> Iterator for MemberIter<'a, R> {
    type Item = Result<GzippedMember<Cursor<Vec<u8>>>, WARCError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_member()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::warc::config::CachingConfig;

    fn member_with_record(content: &str) -> Vec<u8> {
        let record = format!(
            "WARC/1.0\r\nWARC-Type: resource\r\nContent-Length: {}\r\n\r\n{}\r\n\r\n",
            content.len(),
            content
        );
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(record.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_warc_parser_parse_all() {
        let data = b"WARC/1.0\r\nWARC-Type: resource\r\nContent-Length: 3\r\n\r\nabc\r\n\r\n".to_vec();
        let settings = ParserSettings {
            caching: CachingConfig::cache_all(),
            ..ParserSettings::default()
        };

        let mut parser =
            WARCParser::new(Cursor::new(data), &settings, ProcessorConfig::new()).unwrap();
        let records = parser.parse_all().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(&*records[0].content_block().unwrap().bytes().unwrap(), b"abc");
    }

    #[test]
    fn test_gzip_warc_parser_members() {
        let mut combined = member_with_record("hello");
        combined.extend(member_with_record("world!"));

        let settings = ParserSettings {
            caching: CachingConfig::cache_all(),
            ..ParserSettings::default()
        };
        let caching = GzipCachingConfig {
            record: CachingConfig::cache_all(),
            ..GzipCachingConfig::default()
        };

        let mut parser = GzipWARCParser::new(
            Cursor::new(combined),
            &settings,
            caching,
            GzipProcessorConfig::new(),
        )
        .unwrap();

        let members: Vec<_> = parser.members().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(members.len(), 2);
        assert!(members[0].warc_record().is_some());
        assert_eq!(
            &*members[0]
                .warc_record()
                .unwrap()
                .content_block()
                .unwrap()
                .bytes()
                .unwrap(),
            b"hello"
        );
    }
}
