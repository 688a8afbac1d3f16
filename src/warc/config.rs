//! Parser configuration groups, validated at construction time.

use thiserror::Error;

/// Errors raised when a configuration combination is invalid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Content-length checking requires [ParsingConfig::split_records].
    #[error("check_content_lengths requires split_records")]
    ContentLengthCheckRequiresSplit,

    /// Content-length checking requires lazy loading or caching both the
    /// header and content block.
    #[error(
        "check_content_lengths requires lazy byte loading, or both header and \
         content block caching"
    )]
    ContentLengthCheckRequiresAccess,

    /// `parsing_chunk_size` must be at least 2.
    #[error("parsing_chunk_size must be at least 2")]
    ChunkSizeTooSmall,

    /// Content-length checking is only meaningful for the delimiter
    /// strategy; the content-length strategy already guarantees it by
    /// construction.
    #[error("check_content_lengths is only applicable to the delimiter parsing style")]
    ContentLengthCheckRequiresDelimiterStyle,
}

/// Which algorithm is used to find record boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsingStyle {
    /// Scan for the `CRLF CRLF` record delimiter.
    Delimiter,
    /// Read exactly `Content-Length` content bytes.
    ContentLength,
}

/// Controls how records are located within the (decompressed) stream.
#[derive(Debug, Clone)]
pub struct ParsingConfig {
    /// Which parsing strategy to use.
    pub style: ParsingStyle,
    /// Chunk size used by the underlying byte-stream scanners. Minimum 2.
    pub parsing_chunk_size: usize,
    /// Verify each record's content block length against its
    /// `Content-Length` header. Only legal with [ParsingStyle::Delimiter].
    pub check_content_lengths: bool,
    /// Split each record into header and content-block sub-sections.
    pub split_records: bool,
    /// Stop after this many records have been yielded.
    pub stop_after_nth: Option<u64>,
    /// Resolve record/header/content-block bytes from the stream on demand
    /// rather than only from whatever was cached at parse time.
    pub enable_lazy_loading_of_bytes: bool,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            style: ParsingStyle::ContentLength,
            parsing_chunk_size: 1024,
            check_content_lengths: false,
            split_records: true,
            stop_after_nth: None,
            enable_lazy_loading_of_bytes: false,
        }
    }
}

impl ParsingConfig {
    /// Validates this configuration in isolation (not cross-checked against
    /// [CachingConfig]; see [ParserSettings::validate] for the full check).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parsing_chunk_size < 2 {
            return Err(ConfigError::ChunkSizeTooSmall);
        }

        if self.check_content_lengths && !self.split_records {
            return Err(ConfigError::ContentLengthCheckRequiresSplit);
        }

        if self.check_content_lengths && self.style != ParsingStyle::Delimiter {
            return Err(ConfigError::ContentLengthCheckRequiresDelimiterStyle);
        }

        Ok(())
    }
}

/// Controls which byte ranges are cached in memory at parse time.
#[derive(Debug, Clone, Default)]
pub struct CachingConfig {
    /// Cache each whole record's bytes.
    pub record_bytes: bool,
    /// Cache each record's header bytes.
    pub header_bytes: bool,
    /// Cache each header's parsed field map.
    pub parsed_headers: bool,
    /// Cache each record's content-block bytes.
    pub content_block_bytes: bool,
    /// Collect unparsable lines encountered between records.
    pub unparsable_lines: bool,
    /// Cache unparsable lines' bytes.
    pub unparsable_line_bytes: bool,
}

impl CachingConfig {
    /// A config that caches everything; useful for small archives or tests.
    pub fn cache_all() -> Self {
        Self {
            record_bytes: true,
            header_bytes: true,
            parsed_headers: true,
            content_block_bytes: true,
            unparsable_lines: true,
            unparsable_line_bytes: true,
        }
    }
}

/// Extends [CachingConfig] with gzip-member-specific caching options.
#[derive(Debug, Clone, Default)]
pub struct GzipCachingConfig {
    /// The record-level caching configuration.
    pub record: CachingConfig,
    /// Cache each member's compressed bytes.
    pub member_bytes: bool,
    /// Cache each member's decompressed bytes.
    pub member_uncompressed_bytes: bool,
    /// Cache decompressed bytes for members that did not decode as a WARC
    /// record.
    pub non_warc_member_bytes: bool,
}

/// Validated top-level configuration for a [super::WARCParser] /
/// [super::GzipWARCParser].
#[derive(Debug, Clone)]
pub struct ParserSettings {
    /// Record-location configuration.
    pub parsing: ParsingConfig,
    /// Byte-caching configuration.
    pub caching: CachingConfig,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            parsing: ParsingConfig::default(),
            caching: CachingConfig::default(),
        }
    }
}

impl ParserSettings {
    /// Validates the full cross-field rules from the specification:
    ///
    /// - Content-length checking requires [ParsingConfig::split_records]
    ///   AND (lazy loading OR both header and content-block caching).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsing.validate()?;

        if self.parsing.check_content_lengths {
            let has_access = self.parsing.enable_lazy_loading_of_bytes
                || (self.caching.header_bytes && self.caching.content_block_bytes);

            if !has_access {
                return Err(ConfigError::ContentLengthCheckRequiresAccess);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ParserSettings::default().validate().is_ok());
    }

    #[test]
    fn test_content_length_check_requires_split() {
        let mut config = ParserSettings::default();
        config.parsing.split_records = false;
        config.parsing.check_content_lengths = true;

        assert_eq!(
            config.validate(),
            Err(ConfigError::ContentLengthCheckRequiresSplit)
        );
    }

    #[test]
    fn test_content_length_check_requires_access() {
        let mut config = ParserSettings::default();
        config.parsing.check_content_lengths = true;
        config.caching.header_bytes = false;
        config.caching.content_block_bytes = false;
        config.parsing.enable_lazy_loading_of_bytes = false;

        assert_eq!(
            config.validate(),
            Err(ConfigError::ContentLengthCheckRequiresAccess)
        );
    }

    #[test]
    fn test_content_length_check_allowed_with_caching() {
        let mut config = ParserSettings::default();
        config.parsing.check_content_lengths = true;
        config.caching.header_bytes = true;
        config.caching.content_block_bytes = true;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_size_too_small() {
        let mut config = ParsingConfig::default();
        config.parsing_chunk_size = 1;

        assert_eq!(config.validate(), Err(ConfigError::ChunkSizeTooSmall));
    }
}
