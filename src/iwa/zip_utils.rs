//! Reading IWA entries out of ZIP archives.
//!
//! Both `Index.zip` inside a bundle directory and single-file documents are
//! plain ZIP archives whose `.iwa` members hold chunk-framed object streams.
//! Members are returned raw; decompression happens in the loader so that
//! detection and decoding can share the work.

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use tracing::{debug, trace};
use zip::ZipArchive;

use crate::iwa::Result;
use crate::iwa::bundle::{ArchiveMember, Entry, UnreadableEntry};
use crate::iwa::config::LoadOptions;

/// Read every object-stream member of a ZIP archive, in central-directory
/// order.
///
/// A member whose local header, compressed data or checksum is bad comes back
/// as an [`UnreadableEntry`] in its place; the rest of the archive is still
/// read.
///
/// # Examples
///
/// ```rust,no_run
/// use std::fs::File;
/// use zip::ZipArchive;
/// use iwork_index::iwa::LoadOptions;
/// use iwork_index::iwa::zip_utils::read_entries;
///
/// let file = File::open("Index.zip")?;
/// let mut archive = ZipArchive::new(file)?;
/// for member in read_entries(&mut archive, &LoadOptions::default()) {
///     match member {
///         Ok(entry) => println!("{}: {} bytes", entry.name, entry.data.len()),
///         Err(unreadable) => println!("{}: {}", unreadable.name, unreadable.error),
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn read_entries<R: Read + Seek>(
    zip_archive: &mut ZipArchive<R>,
    options: &LoadOptions,
) -> Vec<ArchiveMember> {
    let mut members = Vec::new();

    for i in 0..zip_archive.len() {
        let Some(name) = zip_archive.name_for_index(i) else {
            continue;
        };
        if name.ends_with('/') || !options.is_entry(name) {
            continue;
        }
        let name = name.to_string();

        match read_member(zip_archive, i) {
            Ok(data) => {
                trace!(name = %name, bytes = data.len(), "read zip member");
                members.push(Ok(Entry { name, data }));
            },
            Err(error) => {
                debug!(name = %name, %error, "unreadable zip member");
                members.push(Err(UnreadableEntry { name, error }));
            },
        }
    }

    members
}

fn read_member<R: Read + Seek>(zip_archive: &mut ZipArchive<R>, index: usize) -> Result<Vec<u8>> {
    let mut zip_file = zip_archive.by_index(index)?;
    // The declared size is untrusted; let the buffer grow with what inflates
    let mut data = Vec::new();
    zip_file.read_to_end(&mut data)?;
    Ok(data)
}

/// Open a ZIP file on disk and read its object-stream members
pub fn read_entries_from_path(path: &Path, options: &LoadOptions) -> Result<Vec<ArchiveMember>> {
    let file = File::open(path)?;
    let mut zip_archive = ZipArchive::new(file)?;
    Ok(read_entries(&mut zip_archive, options))
}

/// Read the object-stream members of an in-memory ZIP archive
pub fn read_entries_from_bytes(bytes: &[u8], options: &LoadOptions) -> Result<Vec<ArchiveMember>> {
    let mut zip_archive = ZipArchive::new(Cursor::new(bytes))?;
    Ok(read_entries(&mut zip_archive, options))
}
