//! Record/member filters and handlers, and the ordered chains that drive
//! them (`ProcessorConfig`).

use std::io::{Read, Seek};

use regex::Regex;

use super::model::{GzippedMember, Record, UnparsableLine};
use super::WARCError;

/// Decides whether a record should continue through the pipeline.
pub trait RecordFilter<S> {
    /// Returns whether `record` is accepted.
    fn accept(&self, record: &Record<S>) -> Result<bool, WARCError>;
}

/// Observes accepted records.
pub trait RecordHandler<S> {
    /// Called once per accepted record, in filter-chain order.
    fn handle(&mut self, record: &Record<S>) -> Result<(), WARCError>;
}

/// Observes lines that did not parse as part of any record.
pub trait UnparsableLineHandler<S> {
    /// Called once per unparsable line.
    fn handle(&mut self, line: &UnparsableLine<S>) -> Result<(), WARCError>;
}

/// Called once parsing has finished (successfully or not).
pub trait ParserCallback {
    /// Receives a summary of how the parse ended.
    fn call(&mut self, outcome: &ParseOutcome) -> Result<(), WARCError>;
}

/// Decides whether a gzip member should be decoded into a record.
pub trait MemberFilter<S> {
    /// Returns whether `member` is accepted.
    fn accept(&self, member: &GzippedMember<S>) -> Result<bool, WARCError>;
}

/// Observes accepted gzip members.
pub trait MemberHandler<S> {
    /// Called once per accepted member.
    fn handle(&mut self, member: &GzippedMember<S>) -> Result<(), WARCError>;
}

/// Summary of how a parse run ended, passed to [ParserCallback]s.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// Number of records yielded to the consumer.
    pub records_yielded: u64,
    /// Number of unparsable lines encountered.
    pub unparsable_lines: u64,
    /// Fatal format error, if parsing ended abnormally.
    pub error: Option<String>,
    /// Non-fatal warnings collected during the parse.
    pub warnings: Vec<String>,
}

/// Ordered filter/handler/callback chains for a record-level parse.
#[derive(Default)]
pub struct ProcessorConfig<S> {
    /// Filters run, in order, against every extracted record.
    pub record_filters: Vec<Box<dyn RecordFilter<S>>>,
    /// Handlers run, in order, against every accepted record.
    pub record_handlers: Vec<Box<dyn RecordHandler<S>>>,
    /// Handlers run, in order, against every unparsable line.
    pub unparsable_line_handlers: Vec<Box<dyn UnparsableLineHandler<S>>>,
    /// Callbacks run once, in order, when the parse ends.
    pub parser_callbacks: Vec<Box<dyn ParserCallback>>,
}

impl<S> ProcessorConfig<S> {
    /// Creates an empty `ProcessorConfig`.
    pub fn new() -> Self {
        Self {
            record_filters: Vec::new(),
            record_handlers: Vec::new(),
            unparsable_line_handlers: Vec::new(),
            parser_callbacks: Vec::new(),
        }
    }
}

/// Extends [ProcessorConfig] with gzip-member-level chains.
#[derive(Default)]
pub struct GzipProcessorConfig<S> {
    /// The record-level processor configuration.
    pub record: ProcessorConfig<S>,
    /// Filters run, in order, against every located gzip member.
    pub member_filters: Vec<Box<dyn MemberFilter<S>>>,
    /// Handlers run, in order, against every accepted gzip member.
    pub member_handlers: Vec<Box<dyn MemberHandler<S>>>,
}

impl<S> GzipProcessorConfig<S> {
    /// Creates an empty `GzipProcessorConfig`.
    pub fn new() -> Self {
        Self {
            record: ProcessorConfig::new(),
            member_filters: Vec::new(),
            member_handlers: Vec::new(),
        }
    }
}

/// Comparison operators for [record_content_length_filter].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `>=`
    Ge,
    /// `>`
    Gt,
}

impl ComparisonOp {
    fn compare(self, lhs: u64, rhs: u64) -> bool {
        match self {
            ComparisonOp::Lt => lhs < rhs,
            ComparisonOp::Le => lhs <= rhs,
            ComparisonOp::Eq => lhs == rhs,
            ComparisonOp::Ge => lhs >= rhs,
            ComparisonOp::Gt => lhs > rhs,
        }
    }
}

struct FnFilter<F>(F);

impl<S, F> RecordFilter<S> for FnFilter<F>
where
    F: Fn(&Record<S>) -> Result<bool, WARCError>,
{
    fn accept(&self, record: &Record<S>) -> Result<bool, WARCError> {
        (self.0)(record)
    }
}

fn media_type_matches(value: &str, media_type: &str) -> bool {
    value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .eq_ignore_ascii_case(media_type)
}

/// Accepts HTTP request records whose method is one of `verbs`.
pub fn http_verb_filter<S: Read + Seek + 'static>(
    verbs: Vec<String>,
) -> Box<dyn RecordFilter<S>> {
    Box::new(FnFilter(move |record: &Record<S>| {
        let Some(header_block) = record.get_http_header_block()? else {
            return Ok(false);
        };
        let method = header_block
            .split(|&b| b == b' ')
            .next()
            .map(|m| String::from_utf8_lossy(m).to_string())
            .unwrap_or_default();

        Ok(verbs.iter().any(|v| v.eq_ignore_ascii_case(&method)))
    }))
}

/// Accepts HTTP response records whose status code is one of `codes`.
pub fn http_status_filter<S: Read + Seek + 'static>(codes: Vec<u16>) -> Box<dyn RecordFilter<S>> {
    Box::new(FnFilter(move |record: &Record<S>| {
        let Some(header_block) = record.get_http_header_block()? else {
            return Ok(false);
        };
        let status = String::from_utf8_lossy(&header_block)
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse::<u16>().ok());

        Ok(status.map(|code| codes.contains(&code)).unwrap_or(false))
    }))
}

/// Accepts records whose WARC header field `name` equals `value`
/// (case-insensitive on the value).
pub fn warc_named_field_filter<S: Read + Seek + 'static>(
    name: String,
    value: String,
) -> Box<dyn RecordFilter<S>> {
    Box::new(FnFilter(move |record: &Record<S>| {
        Ok(record
            .warc_field(&name)
            .map(|v| v.eq_ignore_ascii_case(&value))
            .unwrap_or(false))
    }))
}

/// Accepts records whose named WARC header field matches `pattern`.
pub fn warc_header_regex_filter<S: Read + Seek + 'static>(
    name: String,
    pattern: Regex,
) -> Box<dyn RecordFilter<S>> {
    Box::new(FnFilter(move |record: &Record<S>| {
        Ok(record
            .warc_field(&name)
            .map(|v| pattern.is_match(&v))
            .unwrap_or(false))
    }))
}

/// Accepts records whose WARC `Content-Type` names `media_type`.
pub fn record_content_type_filter<S: Read + Seek + 'static>(
    media_type: String,
) -> Box<dyn RecordFilter<S>> {
    Box::new(FnFilter(move |record: &Record<S>| {
        Ok(record
            .warc_field("Content-Type")
            .map(|v| media_type_matches(&v, &media_type))
            .unwrap_or(false))
    }))
}

/// Accepts records whose `Content-Length` compares to `length` via `op`.
pub fn record_content_length_filter<S: Read + Seek + 'static>(
    op: ComparisonOp,
    length: u64,
) -> Box<dyn RecordFilter<S>> {
    Box::new(FnFilter(move |record: &Record<S>| {
        let Some(content_block) = record.content_block() else {
            return Ok(false);
        };
        Ok(op.compare(content_block.length(), length))
    }))
}

/// Accepts records whose captured HTTP header field `name` equals `value`.
pub fn http_header_filter<S: Read + Seek + 'static>(
    name: String,
    value: String,
) -> Box<dyn RecordFilter<S>> {
    Box::new(FnFilter(move |record: &Record<S>| {
        let Some(header_block) = record.get_http_header_block()? else {
            return Ok(false);
        };
        let fields = crate::http::body::parse_header_fields(&header_block)?;
        Ok(fields.get_str(name.as_str()).map(|v| v.eq_ignore_ascii_case(&value)).unwrap_or(false))
    }))
}

/// Accepts HTTP responses whose captured `Content-Type` names `media_type`.
pub fn http_response_content_type_filter<S: Read + Seek + 'static>(
    media_type: String,
) -> Box<dyn RecordFilter<S>> {
    Box::new(FnFilter(move |record: &Record<S>| {
        let Some(header_block) = record.get_http_header_block()? else {
            return Ok(false);
        };
        let fields = crate::http::body::parse_header_fields(&header_block)?;
        Ok(fields
            .get_str("Content-Type")
            .map(|v| media_type_matches(v, &media_type))
            .unwrap_or(false))
    }))
}
