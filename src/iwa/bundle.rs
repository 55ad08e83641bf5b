//! iWork Bundle Probing
//!
//! A document on disk comes in one of three layouts:
//! - a bundle directory with the objects in `Index.zip`
//! - a single-file document that is itself the ZIP (iWork 5.5 and later)
//! - a pre-IWA bundle with the objects in an SQLite `index.db`
//!
//! [`probe`] tries them in that order and returns the first that opens.

use std::path::Path;

use tracing::debug;

#[cfg(feature = "sqlite")]
use crate::iwa::database::Database;
use crate::iwa::config::LoadOptions;
use crate::iwa::zip_utils::read_entries_from_path;
use crate::iwa::{Error, Result};

/// One raw object-stream entry: a chunk-framed `.iwa` member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Member name inside the archive, used in diagnostics
    pub name: String,
    /// Framed, still-compressed bytes
    pub data: Vec<u8>,
}

impl Entry {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// A member of an opened archive that could not be read
#[derive(Debug)]
pub struct UnreadableEntry {
    pub name: String,
    pub error: Error,
}

/// One object-stream member as read from an archive
pub type ArchiveMember = std::result::Result<Entry, UnreadableEntry>;

/// An opened document source
#[derive(Debug)]
pub enum Source {
    /// Object-stream members of a ZIP archive, in central-directory order.
    /// Once the archive opens it is the source, even if members are damaged.
    Archive(Vec<ArchiveMember>),
    /// A legacy SQLite object store
    #[cfg(feature = "sqlite")]
    Database(Database),
}

/// Open the first source found at `path`.
///
/// A source that exists but cannot be read is logged and skipped; only when
/// every layout fails is [`Error::UnrecognizedDocument`] returned.
pub fn probe(path: &Path, options: &LoadOptions) -> Result<Source> {
    let index_archive = path.join(&options.index_archive);
    match read_entries_from_path(&index_archive, options) {
        Ok(members) => {
            debug!(
                path = %index_archive.display(),
                members = members.len(),
                "opened index archive"
            );
            return Ok(Source::Archive(members));
        },
        Err(error) => debug!(path = %index_archive.display(), %error, "no index archive"),
    }

    match read_entries_from_path(path, options) {
        Ok(members) => {
            debug!(path = %path.display(), members = members.len(), "opened single-file document");
            return Ok(Source::Archive(members));
        },
        Err(error) => debug!(path = %path.display(), %error, "not a single-file document"),
    }

    #[cfg(feature = "sqlite")]
    {
        let database_path = path.join(&options.database_file);
        if database_path.is_file() {
            match Database::open(&database_path) {
                Ok(database) => {
                    debug!(path = %database_path.display(), "opened legacy database");
                    return Ok(Source::Database(database));
                },
                Err(error) => {
                    debug!(path = %database_path.display(), %error, "unreadable legacy database")
                },
            }
        }
    }

    Err(Error::UnrecognizedDocument {
        path: path.to_path_buf(),
    })
}
