//! iwork-index - A Rust library for decoding Apple iWork object archives
//!
//! Pages, Keynote and Numbers documents store their content as protobuf
//! objects in Snappy-framed `.iwa` streams. This library reverses the framing,
//! splits the streams into objects, works out which application wrote the
//! document, decodes every object with the schema tables you provide and hands
//! back an identifier-keyed [`Index`].
//!
//! # Features
//!
//! - **Frame decoder**: iWork's headerless, checksum-free Snappy chunk framing
//! - **Object stream parser**: varint-prefixed `ArchiveInfo` records and payloads
//! - **Type detection**: Keynote, Pages or Numbers from the type tags alone
//! - **Injected schemas**: decode tables are plain values, not globals
//! - **Fault tolerance**: bad objects and entries are skipped and reported
//! - **Legacy documents**: pre-IWA bundles with an SQLite `index.db` (feature `sqlite`)
//!
//! # Example - Opening a document
//!
//! ```no_run
//! use iwork_index::{DecoderRegistry, Index};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Tables mapping type tags to decode functions, generated elsewhere
//! let registry = DecoderRegistry::empty();
//!
//! let index = Index::open("Report.pages", &registry)?;
//! println!("{} document, {} objects", index.document_type(), index.len());
//!
//! for skipped in &index.report().skipped_objects {
//!     println!("skipped {:?}: {}", skipped.identifier, skipped.reason);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Following references
//!
//! ```ignore
//! let show = index.get_as::<kn::ShowArchive>(1).unwrap();
//! for slide in &show.slides {
//!     if let Some(slide) = index.deref_as::<kn::SlideArchive>(Some(slide)) {
//!         println!("{:?}", slide.title);
//!     }
//! }
//! ```

/// iWork archive (IWA) decoding
///
/// Frame decoding, object stream parsing, document type detection, decode
/// dispatch and the resulting object index.
pub mod iwa;

// Re-export commonly used types for convenience
pub use iwa::{
    DecodeFn, DecodedMessage, DecoderRegistry, DocumentType, EntryFailurePolicy, Error, Index,
    LoadOptions, Object, Reference, Result, decode_as,
};
