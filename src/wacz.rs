//! WACZ container resource location.
//!
//! A WACZ file is a zip archive holding a `datapackage.json` manifest plus
//! one or more WARC resources. This module does exactly one thing: read
//! `datapackage.json` and return the path of the `.warc.gz` resource inside
//! the archive. It does not open that entry, re-implement zip handling, or
//! offer any other container functionality — the caller hands the returned
//! path to its own [zip::ZipArchive] and feeds the resulting entry reader to
//! [crate::warc::GzipMemberLocator].

use std::io::{Read, Seek};

use serde::Deserialize;
use thiserror::Error;

/// Errors locating the WARC resource inside a WACZ archive.
#[derive(Debug, Error)]
pub enum WaczError {
    /// The archive has no `datapackage.json` at its root.
    #[error("datapackage.json not found in archive")]
    MissingDataPackage,

    /// `datapackage.json` could not be parsed as JSON, or didn't match the
    /// expected shape.
    #[error("malformed datapackage.json")]
    MalformedDataPackage(#[source] serde_json::Error),

    /// No resource in the manifest names a path ending in `.warc.gz`.
    #[error("no .warc.gz resource listed in datapackage.json")]
    NoWarcResource,

    /// Error reading from the zip archive.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// IO error reading an archive entry.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct DataPackage {
    resources: Vec<DataResource>,
}

#[derive(Debug, Deserialize)]
struct DataResource {
    path: String,
}

/// Reads `datapackage.json` from `archive` and returns the path of its first
/// listed `.warc.gz` resource.
pub fn locate_warc_gz_path<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<String, WaczError> {
    let mut entry = archive
        .by_name("datapackage.json")
        .map_err(|_| WaczError::MissingDataPackage)?;

    let mut contents = String::new();
    entry.read_to_string(&mut contents)?;
    drop(entry);

    let package: DataPackage =
        serde_json::from_str(&contents).map_err(WaczError::MalformedDataPackage)?;

    package
        .resources
        .into_iter()
        .map(|resource| resource.path)
        .find(|path| path.ends_with(".warc.gz"))
        .ok_or(WaczError::NoWarcResource)
}
