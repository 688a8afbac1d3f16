//! Media type (MIME type) parsing.

use std::str::FromStr;

use thiserror::Error;

/// Error parsing a media type value.
#[derive(Debug, Error)]
#[error("malformed media type")]
pub struct MediaTypeError;

/// A parsed `type/subtype` media type, ignoring any parameters.
///
/// Only the type and subtype are kept; this crate only needs media types to
/// classify record content (for example to recognize `application/http`),
/// not to round-trip `Content-Type` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// The top-level type, such as `application` or `text`, lowercased.
    pub type_: String,
    /// The subtype, such as `http` or `plain`, lowercased.
    pub subtype: String,
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.split(';').next().unwrap_or("").trim();
        let (type_, subtype) = value.split_once('/').ok_or(MediaTypeError)?;

        let type_ = type_.trim();
        let subtype = subtype.trim();

        if type_.is_empty() || subtype.is_empty() {
            return Err(MediaTypeError);
        }

        Ok(Self {
            type_: type_.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let media_type: MediaType = "application/http;msgtype=response".parse().unwrap();
        assert_eq!(media_type.type_, "application");
        assert_eq!(media_type.subtype, "http");
    }

    #[test]
    fn test_parse_err() {
        assert!("application".parse::<MediaType>().is_err());
    }
}
