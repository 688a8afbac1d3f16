use std::io::{Cursor, Write};

use warclens::warc::{
    CachingConfig, ComparisonOp, GzipCachingConfig, GzipMemberLocator, GzipProcessorConfig,
    ParserSettings, ParsingConfig, ParsingStyle, ProcessorConfig, WARCParser,
};

fn record(warc_type: &str, record_id: &str, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"WARC/1.0\r\n");
    out.extend_from_slice(format!("WARC-Type: {warc_type}\r\n").as_bytes());
    out.extend_from_slice(format!("WARC-Record-ID: {record_id}\r\n").as_bytes());
    out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

fn nine_record_warc() -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..9 {
        out.extend_from_slice(&record(
            "resource",
            &format!("<urn:uuid:0000000{i}-0002-0003-0004-000000000005>"),
            format!("record body number {i}").as_bytes(),
        ));
    }
    out
}

#[test]
fn nine_records_content_length_strategy() {
    let data = nine_record_warc();
    let settings = ParserSettings {
        caching: CachingConfig::cache_all(),
        ..ParserSettings::default()
    };

    let mut parser = WARCParser::new(Cursor::new(data), &settings, ProcessorConfig::new()).unwrap();
    let records = parser.parse_all().unwrap();

    assert_eq!(records.len(), 9);
    assert!(parser.error().is_none());

    let mut previous_end = 0u64;
    for r in &records {
        assert!(r.start() < r.end());
        assert_eq!(r.start(), previous_end);
        previous_end = r.end();
    }
}

#[test]
fn nine_records_delimiter_strategy_content_length_check_all_true() {
    let data = nine_record_warc();
    let settings = ParserSettings {
        parsing: ParsingConfig {
            style: ParsingStyle::Delimiter,
            check_content_lengths: true,
            ..ParsingConfig::default()
        },
        caching: CachingConfig::cache_all(),
        ..ParserSettings::default()
    };

    let mut parser = WARCParser::new(Cursor::new(data), &settings, ProcessorConfig::new()).unwrap();
    let records = parser.parse_all().unwrap();

    assert_eq!(records.len(), 9);
    for r in &records {
        assert_eq!(r.content_length_check_result(), Some(true));
    }
}

#[test]
fn stop_after_nth_two() {
    let data = nine_record_warc();
    let settings = ParserSettings {
        parsing: ParsingConfig {
            stop_after_nth: Some(2),
            ..ParsingConfig::default()
        },
        caching: CachingConfig::cache_all(),
        ..ParserSettings::default()
    };

    let mut parser = WARCParser::new(Cursor::new(data), &settings, ProcessorConfig::new()).unwrap();
    let records = parser.parse_all().unwrap();

    assert_eq!(records.len(), 2);
}

#[test]
fn record_content_length_filter_excludes_short_records() {
    use warclens::warc::record_content_length_filter;

    let data = nine_record_warc();
    let settings = ParserSettings {
        caching: CachingConfig::cache_all(),
        ..ParserSettings::default()
    };
    let mut processor = ProcessorConfig::new();
    processor
        .record_filters
        .push(record_content_length_filter(ComparisonOp::Ge, 1000));

    let mut parser = WARCParser::new(Cursor::new(data), &settings, processor).unwrap();
    let records = parser.parse_all().unwrap();

    assert!(records.is_empty());
}

fn gzip_member(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn nine_gzip_members_round_trip_through_locator() {
    let mut combined = Vec::new();
    let mut boundaries = Vec::new();

    for i in 0..9 {
        let r = record(
            "resource",
            &format!("<urn:uuid:0000000{i}-0002-0003-0004-000000000005>"),
            format!("record body number {i}").as_bytes(),
        );
        boundaries.push(r.len() as u64);
        combined.extend_from_slice(&gzip_member(&r));
    }

    let mut locator = GzipMemberLocator::new(Cursor::new(combined));
    let mut count = 0;
    let mut uncompressed_total = 0u64;

    while let Some((location, bytes)) = locator.next_member().unwrap() {
        assert_eq!(location.uncompressed_start, uncompressed_total);
        assert_eq!(bytes.len() as u64, boundaries[count]);
        uncompressed_total = location.uncompressed_end;
        count += 1;
    }

    assert_eq!(count, 9);
    assert_eq!(locator.member_count(), 9);
}

#[test]
fn gzip_warc_parser_decodes_one_record_per_member() {
    use warclens::warc::GzipWARCParser;

    let mut combined = Vec::new();
    for i in 0..9 {
        let r = record(
            "resource",
            &format!("<urn:uuid:0000000{i}-0002-0003-0004-000000000005>"),
            format!("record body number {i}").as_bytes(),
        );
        combined.extend_from_slice(&gzip_member(&r));
    }

    let settings = ParserSettings::default();
    let caching = GzipCachingConfig {
        record: CachingConfig::cache_all(),
        ..GzipCachingConfig::default()
    };

    let mut parser =
        GzipWARCParser::new(Cursor::new(combined), &settings, caching, GzipProcessorConfig::new()).unwrap();
    let members = parser.members().collect::<Result<Vec<_>, _>>().unwrap();

    assert_eq!(members.len(), 9);
    for member in &members {
        assert!(member.warc_record().is_some());
    }
}

#[test]
fn http_response_with_gzip_body_decodes() {
    let plain = b"This domain is for use in illustrative examples in documents.";
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(plain).unwrap();
    let gzipped_body = encoder.finish().unwrap();

    let mut http_message = Vec::new();
    http_message.extend_from_slice(b"HTTP/1.1 200 OK\r\n");
    http_message.extend_from_slice(b"Content-Encoding: gzip\r\n");
    http_message.extend_from_slice(format!("Content-Length: {}\r\n", gzipped_body.len()).as_bytes());
    http_message.extend_from_slice(b"\r\n");
    http_message.extend_from_slice(&gzipped_body);

    let mut warc = Vec::new();
    warc.extend_from_slice(b"WARC/1.0\r\n");
    warc.extend_from_slice(b"WARC-Type: response\r\n");
    warc.extend_from_slice(b"Content-Type: application/http; msgtype=response\r\n");
    warc.extend_from_slice(format!("Content-Length: {}\r\n", http_message.len()).as_bytes());
    warc.extend_from_slice(b"\r\n");
    warc.extend_from_slice(&http_message);
    warc.extend_from_slice(b"\r\n\r\n");

    let settings = ParserSettings {
        caching: CachingConfig::cache_all(),
        ..ParserSettings::default()
    };
    let mut parser = WARCParser::new(Cursor::new(warc), &settings, ProcessorConfig::new()).unwrap();
    let records = parser.parse_all().unwrap();

    assert_eq!(records.len(), 1);
    let decoded = records[0].get_decompressed_http_body().unwrap().unwrap();
    let decoded_text = String::from_utf8(decoded).unwrap();
    assert!(decoded_text.contains("This domain is for use in illustrative examples in documents."));
}

#[test]
fn http_response_with_brotli_body_decodes() {
    let plain_text = format!("<html><body>{}jQuery{}</body></html>", "x".repeat(40_000), "y".repeat(47_000));
    let plain = plain_text.as_bytes();

    let mut compressed = Vec::new();
    {
        let mut compressor = brotli::CompressorWriter::new(&mut compressed, 4096, 9, 22);
        compressor.write_all(plain).unwrap();
    }

    let mut http_message = Vec::new();
    http_message.extend_from_slice(b"HTTP/1.1 200 OK\r\n");
    http_message.extend_from_slice(b"Content-Encoding: br\r\n");
    http_message.extend_from_slice(format!("Content-Length: {}\r\n", compressed.len()).as_bytes());
    http_message.extend_from_slice(b"\r\n");
    http_message.extend_from_slice(&compressed);

    let mut warc = Vec::new();
    warc.extend_from_slice(b"WARC/1.0\r\n");
    warc.extend_from_slice(b"WARC-Type: response\r\n");
    warc.extend_from_slice(b"Content-Type: application/http; msgtype=response\r\n");
    warc.extend_from_slice(format!("Content-Length: {}\r\n", http_message.len()).as_bytes());
    warc.extend_from_slice(b"\r\n");
    warc.extend_from_slice(&http_message);
    warc.extend_from_slice(b"\r\n\r\n");

    let settings = ParserSettings {
        caching: CachingConfig::cache_all(),
        ..ParserSettings::default()
    };
    let mut parser = WARCParser::new(Cursor::new(warc), &settings, ProcessorConfig::new()).unwrap();
    let records = parser.parse_all().unwrap();

    assert_eq!(records.len(), 1);

    let undecoded = records[0].get_http_body_block().unwrap().unwrap();
    assert_eq!(undecoded.len(), compressed.len());
    assert!(std::str::from_utf8(&undecoded).is_err());

    let decoded = records[0].get_decompressed_http_body().unwrap().unwrap();
    let decoded_text = String::from_utf8(decoded).unwrap();
    assert!(decoded_text.contains("jQuery"));
    assert_eq!(decoded_text.len(), plain.len());
}
