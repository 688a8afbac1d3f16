//! WARC file processing.
pub mod config;
pub mod extract;
pub mod facade;
pub mod filters;
mod gzip_locate;
mod header;
pub mod model;
pub mod primitives;
mod reader;
mod statemachine;
mod writer;

pub use config::*;
pub use facade::*;
pub use filters::*;
pub use gzip_locate::*;
pub use header::*;
pub use model::*;
pub use reader::*;
pub use statemachine::*;
pub use writer::*;

use thiserror::Error;

/// Errors during parsing or formatting of WARC files.
#[derive(Error, Debug)]
pub enum WARCError {
    /// Not a recognized WARC file.
    #[error("unknown format")]
    UnknownFormat,

    /// Header couldn't be parsed or formatted.
    #[error("malformed header")]
    MalformedHeader {
        /// Number of bytes read from the (uncompressed) input stream.
        offset: u64,
        /// Source of the error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The length of the record body does not correspond with the value in the header.
    #[error("wrong block length")]
    WrongBlockLength {
        /// ID of the record
        record_id: String,
    },

    /// Field contained an invalid value.
    #[error("invalid field value")]
    InvalidFieldValue {
        /// Name of the field.
        name: String,
        /// ID of the record.
        record_id: String,
        /// Source of the error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// End of the record is malformed.
    #[error("malformed footer")]
    MalformedFooter {
        /// Number of bytes read from the (uncompressed) input stream.
        offset: u64,
    },

    /// IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Attempted to access the bytes of a range with neither a cached copy
    /// nor a stream back-reference.
    #[error("no byte source available for range [{start}, {end})")]
    Access {
        /// Start offset of the range.
        start: u64,
        /// End offset of the range.
        end: u64,
    },

    /// Error extracting or decoding a captured HTTP message.
    #[error(transparent)]
    Http(#[from] crate::http::HTTPError),
}