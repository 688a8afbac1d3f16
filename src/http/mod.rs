//! HTTP message parsing for archived record content.
//!
//! This crate only ever sees complete, already-captured HTTP messages
//! stored in record content blocks; it does not implement a live HTTP
//! client or server. The supported surface is deliberately narrow: split a
//! captured message into header and body, and decode the body (chunked
//! transfer coding and stacked `Content-Encoding` codecs).
pub mod body;
pub mod chunked;
pub mod media_type;

use thiserror::Error;

/// Errors while parsing or decoding a captured HTTP message.
#[derive(Error, Debug)]
pub enum HTTPError {
    /// Unexpected end of data.
    #[error("unexpected end of data")]
    UnexpectedEnd,

    /// Header couldn't be parsed.
    #[error("malformed header")]
    MalformedHeader {
        /// Source of the error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Chunked transfer coding was malformed.
    #[error("malformed chunked transfer coding")]
    MalformedChunk {
        /// Source of the error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
