//! iWork Archive Format Support
//!
//! This module decodes Apple's iWork file formats (Pages, Keynote, Numbers)
//! which store their content in the IWA (iWork Archive) format.
//!
//! ## iWork File Structure
//!
//! iWork documents are bundles containing:
//! - `Index.zip`: Contains IWA files with serialized objects
//! - `Data/`: Directory containing media assets
//! - `Metadata/`: Document metadata and properties
//!
//! Single-file documents are the bundle itself zipped, and documents written
//! before the IWA format keep their objects in an SQLite `index.db`.
//!
//! ## IWA Format
//!
//! Each `.iwa` file contains:
//! - Snappy-compressed data (custom framing without stream identifier)
//! - Variable-length integers for ArchiveInfo header lengths
//! - ArchiveInfo and MessageInfo headers describing each object
//! - Protobuf-encoded object payloads, back-to-back after their header
//!
//! ## Pipeline
//!
//! [`snappy`] reverses the chunk framing, [`archive`] splits the stream into
//! object units, [`registry`] decides the document family from the type tags,
//! [`protobuf`] dispatches payloads to the injected decode tables and
//! [`object_index`] keeps the resulting identifier-keyed graph.

pub mod archive;
pub mod bundle;
pub mod config;
#[cfg(feature = "sqlite")]
pub mod database;
pub mod object_index;
pub mod protobuf;
pub mod ref_graph;
pub mod registry;
pub mod snappy;
pub mod varint;
pub mod zip_utils;

#[cfg(test)]
pub(crate) mod test_support;

use std::path::PathBuf;

/// Re-export commonly used types
pub use archive::{ArchiveInfo, MessageInfo, ObjectStream, ObjectUnit, Reference};
pub use bundle::{ArchiveMember, Entry, Source, UnreadableEntry};
pub use config::{EntryFailurePolicy, LoadOptions};
#[cfg(feature = "sqlite")]
pub use database::{Database, ObjectRow};
pub use object_index::{Index, IndexSummary, LoadReport, Object, SkippedEntry, SkippedObject};
pub use protobuf::{DecodeFn, DecodeTable, DecodedMessage, DecoderRegistry, decode_as};
pub use ref_graph::ReferenceGraph;
pub use registry::{DETECTION_RULES, DetectionRule, DocumentType, TagPredicate, TypeDetector};
pub use snappy::SnappyStream;

/// Error types for iWork parsing
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A chunk header carried a type other than 0 (compressed block)
    #[error("invalid chunk type {chunk_type} at offset {offset}, expected 0")]
    InvalidChunkType { offset: usize, chunk_type: u8 },

    /// A chunk header or body runs past the end of the entry
    #[error("truncated chunk at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedChunk {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Snappy decompression error in chunk at offset {offset}: {source}")]
    Snappy {
        offset: usize,
        #[source]
        source: snap::Error,
    },

    /// A block header declares more output than a block of its size can hold
    #[error("chunk at offset {offset} declares {declared} bytes, at most {limit} possible")]
    OversizedChunk {
        offset: usize,
        declared: usize,
        limit: usize,
    },

    /// The object stream ended in the middle of a record
    #[error("object stream truncated while reading {context} at offset {offset}")]
    Truncated { context: &'static str, offset: usize },

    #[error("variable-length integer overflow at offset {offset}")]
    VarintOverflow { offset: usize },

    #[error("Protobuf decoding error: {0}")]
    ProtobufDecode(#[from] prost::DecodeError),

    #[error("unsupported message type {message_type} for {document_type} documents")]
    UnsupportedMessageType {
        document_type: registry::DocumentType,
        message_type: u32,
    },

    #[error("archive info has no object identifier")]
    MissingIdentifier,

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No source at the path could be opened as an iWork document
    #[error("unrecognized document: {}", path.display())]
    UnrecognizedDocument { path: PathBuf },

    /// No observed type tag matched any detection rule
    #[error("unable to determine document type from content ({tags_seen} distinct type tags seen)")]
    DetectionFailed { tags_seen: u64 },

    /// An entry failed to decode while loading with [`EntryFailurePolicy::Abort`]
    #[error("failed to load entry '{name}': {source}")]
    Entry {
        name: String,
        #[source]
        source: Box<Error>,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
