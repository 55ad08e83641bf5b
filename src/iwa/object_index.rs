//! Object Index for Cross-Referencing in iWork Documents
//!
//! The [`Index`] is the decoded document: every object keyed by its
//! identifier, the document type that selected the schemas, the reference
//! graph read from the message headers, and a report of what was skipped.
//!
//! Loading runs in two phases. Detection decompresses entries in order until
//! the observed type tags settle the document type. Decoding then walks every
//! entry once, reusing the buffers detection already produced, and merges the
//! per-entry results in entry order so a later duplicate identifier always
//! replaces an earlier one.
//!
//! ```rust,no_run
//! use iwork_index::iwa::{DecoderRegistry, Index};
//!
//! # fn registry() -> DecoderRegistry { DecoderRegistry::empty() }
//! let index = Index::open("Presentation.key", &registry())?;
//! println!("{} objects in a {} document", index.len(), index.document_type());
//! # Ok::<(), iwork_index::iwa::Error>(())
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, info, trace, warn};

use crate::iwa::archive::{self, ObjectUnit, Reference};
use crate::iwa::bundle::{self, ArchiveMember, Entry, Source};
use crate::iwa::config::{EntryFailurePolicy, LoadOptions};
#[cfg(feature = "sqlite")]
use crate::iwa::database::{Database, ObjectRow};
use crate::iwa::protobuf::{DecodedMessage, DecoderRegistry};
use crate::iwa::ref_graph::ReferenceGraph;
use crate::iwa::registry::{DocumentType, TypeDetector};
use crate::iwa::snappy::SnappyStream;
use crate::iwa::zip_utils;
use crate::iwa::{Error, Result};

/// A decoded object
#[derive(Debug)]
pub struct Object {
    message_type: u32,
    versions: SmallVec<[u32; 4]>,
    message: Box<dyn DecodedMessage>,
}

impl Object {
    /// Type tag the object was decoded with
    pub fn message_type(&self) -> u32 {
        self.message_type
    }

    /// Format version recorded by the writer
    pub fn versions(&self) -> &[u32] {
        &self.versions
    }

    pub fn message(&self) -> &dyn DecodedMessage {
        self.message.as_ref()
    }

    /// The decoded message as `T`, if that is its schema
    pub fn downcast_ref<T: DecodedMessage>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }

    pub fn is<T: DecodedMessage>(&self) -> bool {
        self.message.is::<T>()
    }
}

/// An object left out of the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedObject {
    /// Entry the object came from
    pub entry: String,
    pub identifier: Option<u64>,
    pub message_type: u32,
    pub reason: String,
}

/// An entry that contributed nothing because its framing or stream was corrupt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

/// What happened while loading
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Entries (or database rows) that went through the decode pass
    pub entries_scanned: usize,
    /// Successful decodes, including ones later replaced by a duplicate identifier
    pub objects_decoded: usize,
    pub skipped_objects: Vec<SkippedObject>,
    pub skipped_entries: Vec<SkippedEntry>,
}

impl LoadReport {
    /// Whether every object of every entry made it into the index
    pub fn is_complete(&self) -> bool {
        self.skipped_objects.is_empty() && self.skipped_entries.is_empty()
    }
}

/// Schema-independent overview of an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub document_type: DocumentType,
    pub object_count: usize,
    pub reference_count: usize,
    /// Number of objects per type tag
    pub type_counts: BTreeMap<u32, usize>,
    pub skipped_objects: usize,
    pub skipped_entries: usize,
}

/// The decoded object graph of one document.
///
/// Immutable once returned. Lookups by identifier are total: a missing
/// identifier is `None`, never an error.
#[derive(Debug)]
pub struct Index {
    document_type: DocumentType,
    objects: HashMap<u64, Object>,
    references: ReferenceGraph,
    report: LoadReport,
}

/// Objects, references and failures decoded from one entry
#[derive(Default)]
struct DecodedEntry {
    objects: Vec<(u64, Object)>,
    references: Vec<(u64, Vec<u64>)>,
    skipped: Vec<SkippedObject>,
}

/// Decompressed entry bodies kept from the detection phase
type DetectedStreams = Vec<Option<Result<SnappyStream>>>;

impl Index {
    /// Open a document with default [`LoadOptions`].
    ///
    /// `path` may be a bundle directory, a single-file document or a legacy
    /// bundle with an SQLite index.
    pub fn open<P: AsRef<Path>>(path: P, registry: &DecoderRegistry) -> Result<Self> {
        Self::open_with(path, registry, &LoadOptions::default())
    }

    /// Open a document, probing `<path>/Index.zip`, then `<path>` as a ZIP,
    /// then `<path>/index.db`.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        registry: &DecoderRegistry,
        options: &LoadOptions,
    ) -> Result<Self> {
        match bundle::probe(path.as_ref(), options)? {
            Source::Archive(members) => Self::from_members(members, registry, options),
            #[cfg(feature = "sqlite")]
            Source::Database(database) => Self::from_database(&database, registry, options),
        }
    }

    /// Load a single-file document held in memory
    pub fn from_bytes(
        bytes: &[u8],
        registry: &DecoderRegistry,
        options: &LoadOptions,
    ) -> Result<Self> {
        let members = zip_utils::read_entries_from_bytes(bytes, options)?;
        Self::from_members(members, registry, options)
    }

    /// Load already-extracted entries, in the given order
    pub fn from_entries<I>(
        entries: I,
        registry: &DecoderRegistry,
        options: &LoadOptions,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = Entry>,
    {
        Self::from_members(entries.into_iter().map(Ok), registry, options)
    }

    /// Load archive members, in the given order.
    ///
    /// An unreadable member counts as a failed entry: detection passes over it
    /// and the decode pass applies [`LoadOptions::entry_failure`] to it.
    pub fn from_members<I>(
        members: I,
        registry: &DecoderRegistry,
        options: &LoadOptions,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = ArchiveMember>,
    {
        let mut entries = Vec::new();
        let mut streams: DetectedStreams = Vec::new();
        for member in members {
            match member {
                Ok(entry) => {
                    entries.push(entry);
                    streams.push(None);
                },
                Err(unreadable) => {
                    entries.push(Entry::new(unreadable.name, Vec::new()));
                    streams.push(Some(Err(unreadable.error)));
                },
            }
        }

        let document_type = detect_document_type(&entries, &mut streams)?;
        let mut index = Self::empty(document_type);

        if options.parallel {
            let outcomes: Vec<Result<DecodedEntry>> = entries
                .par_iter()
                .zip(streams)
                .map(|(entry, stream)| decode_entry(entry, stream, document_type, registry))
                .collect();
            for (entry, outcome) in entries.iter().zip(outcomes) {
                index.merge_entry(&entry.name, outcome, options.entry_failure)?;
            }
        } else {
            for (entry, stream) in entries.iter().zip(streams) {
                let outcome = decode_entry(entry, stream, document_type, registry);
                index.merge_entry(&entry.name, outcome, options.entry_failure)?;
            }
        }

        index.log_loaded();
        Ok(index)
    }

    /// Load a legacy document: one object per database row
    #[cfg(feature = "sqlite")]
    pub fn from_database(
        database: &Database,
        registry: &DecoderRegistry,
        options: &LoadOptions,
    ) -> Result<Self> {
        let mut detector = TypeDetector::new();
        detector.observe_all(database.sample_classes(options.detection_row_limit)?);
        let document_type = detector.detect().ok_or(Error::DetectionFailed {
            tags_seen: detector.distinct_tags(),
        })?;
        debug!(path = %database.path().display(), %document_type, "detected document type");

        let rows = database.objects()?;
        let name = options.database_file.as_str();
        let decode_row = |row: &ObjectRow| {
            decode_units(name, std::iter::once(row.as_unit()), document_type, registry)
        };
        let outcomes: Vec<DecodedEntry> = if options.parallel {
            rows.par_iter().map(decode_row).collect()
        } else {
            rows.iter().map(decode_row).collect()
        };

        let mut index = Self::empty(document_type);
        for decoded in outcomes {
            index.report.entries_scanned += 1;
            index.absorb(decoded);
        }

        index.log_loaded();
        Ok(index)
    }

    fn empty(document_type: DocumentType) -> Self {
        Self {
            document_type,
            objects: HashMap::new(),
            references: ReferenceGraph::new(),
            report: LoadReport::default(),
        }
    }

    /// Fold one entry's outcome into the index, applying the failure policy
    fn merge_entry(
        &mut self,
        name: &str,
        outcome: Result<DecodedEntry>,
        policy: EntryFailurePolicy,
    ) -> Result<()> {
        self.report.entries_scanned += 1;
        match outcome {
            Ok(decoded) => {
                self.absorb(decoded);
                Ok(())
            },
            Err(error) => match policy {
                EntryFailurePolicy::Skip => {
                    warn!(entry = name, %error, "skipping unreadable entry");
                    self.report.skipped_entries.push(SkippedEntry {
                        name: name.to_string(),
                        reason: error.to_string(),
                    });
                    Ok(())
                },
                EntryFailurePolicy::Abort => Err(Error::Entry {
                    name: name.to_string(),
                    source: Box::new(error),
                }),
            },
        }
    }

    fn absorb(&mut self, decoded: DecodedEntry) {
        for (source, targets) in decoded.references {
            self.references.add_references(source, &targets);
        }
        for skipped in decoded.skipped {
            warn!(
                entry = %skipped.entry,
                identifier = ?skipped.identifier,
                message_type = skipped.message_type,
                reason = %skipped.reason,
                "skipping object"
            );
            self.report.skipped_objects.push(skipped);
        }
        for (identifier, object) in decoded.objects {
            self.report.objects_decoded += 1;
            self.objects.insert(identifier, object);
        }
    }

    fn log_loaded(&self) {
        info!(
            document_type = %self.document_type,
            objects = self.objects.len(),
            references = self.references.edge_count(),
            skipped_objects = self.report.skipped_objects.len(),
            skipped_entries = self.report.skipped_entries.len(),
            "loaded document"
        );
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    /// Resolve a reference. A null reference or an identifier with no object
    /// yields `None`.
    pub fn deref(&self, reference: Option<&Reference>) -> Option<&Object> {
        reference.and_then(|reference| self.objects.get(&reference.identifier))
    }

    /// Resolve a reference to a message of schema `T`
    pub fn deref_as<T: DecodedMessage>(&self, reference: Option<&Reference>) -> Option<&T> {
        self.deref(reference).and_then(Object::downcast_ref::<T>)
    }

    pub fn get(&self, identifier: u64) -> Option<&Object> {
        self.objects.get(&identifier)
    }

    pub fn get_as<T: DecodedMessage>(&self, identifier: u64) -> Option<&T> {
        self.get(identifier).and_then(Object::downcast_ref::<T>)
    }

    pub fn contains(&self, identifier: u64) -> bool {
        self.objects.contains_key(&identifier)
    }

    /// Number of distinct identifiers
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Identifiers in no particular order
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.objects.keys().copied()
    }

    /// Objects in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Object)> + '_ {
        self.objects.iter().map(|(&identifier, object)| (identifier, object))
    }

    /// Objects decoded with the given type tag
    pub fn objects_of_type(
        &self,
        message_type: u32,
    ) -> impl Iterator<Item = (u64, &Object)> + '_ {
        self.iter()
            .filter(move |(_, object)| object.message_type == message_type)
    }

    /// References declared in the message headers
    pub fn references(&self) -> &ReferenceGraph {
        &self.references
    }

    /// Declared references whose target is not in the index, sorted
    pub fn dangling_references(&self) -> Vec<(u64, u64)> {
        let mut dangling: Vec<_> = self
            .references
            .edges()
            .filter(|&(_, target)| !self.contains(target))
            .collect();
        dangling.sort_unstable();
        dangling
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn summary(&self) -> IndexSummary {
        let mut type_counts = BTreeMap::new();
        for object in self.objects.values() {
            *type_counts.entry(object.message_type).or_insert(0) += 1;
        }

        IndexSummary {
            document_type: self.document_type,
            object_count: self.objects.len(),
            reference_count: self.references.edge_count(),
            type_counts,
            skipped_objects: self.report.skipped_objects.len(),
            skipped_entries: self.report.skipped_entries.len(),
        }
    }
}

/// Decompress entries in order until the observed tags settle the document
/// type.
///
/// Entries that fail to decompress or parse are passed over here; the decode
/// pass reports them. Slots already filled (unreadable members) are skipped.
/// The buffers produced are left in `streams` for the decode pass.
fn detect_document_type(entries: &[Entry], streams: &mut DetectedStreams) -> Result<DocumentType> {
    let mut detector = TypeDetector::new();

    for (entry, slot) in entries.iter().zip(streams.iter_mut()) {
        if slot.is_some() {
            continue;
        }

        let stream = SnappyStream::decompress(&entry.data);
        match &stream {
            Ok(decompressed) => match archive::message_types(decompressed.data()) {
                Ok(types) => detector.observe_all(types),
                Err(error) => {
                    debug!(entry = %entry.name, %error, "unparseable entry during detection")
                },
            },
            Err(error) => {
                debug!(entry = %entry.name, %error, "undecompressable entry during detection")
            },
        }
        *slot = Some(stream);

        if let Some(document_type) = detector.detect() {
            debug!(entry = %entry.name, %document_type, "detected document type");
            return Ok(document_type);
        }
    }

    Err(Error::DetectionFailed {
        tags_seen: detector.distinct_tags(),
    })
}

/// Decode one entry. Framing and stream errors fail the whole entry; object
/// errors are collected.
fn decode_entry(
    entry: &Entry,
    stream: Option<Result<SnappyStream>>,
    document_type: DocumentType,
    registry: &DecoderRegistry,
) -> Result<DecodedEntry> {
    let stream = match stream {
        Some(stream) => stream?,
        None => SnappyStream::decompress(&entry.data)?,
    };
    let units = archive::parse_objects(stream.data())?;
    Ok(decode_units(&entry.name, units, document_type, registry))
}

fn decode_units<'a>(
    entry: &str,
    units: impl IntoIterator<Item = ObjectUnit<'a>>,
    document_type: DocumentType,
    registry: &DecoderRegistry,
) -> DecodedEntry {
    let mut decoded = DecodedEntry::default();

    for unit in units {
        let Some(identifier) = unit.identifier else {
            decoded.skipped.push(SkippedObject {
                entry: entry.to_string(),
                identifier: None,
                message_type: unit.message_type,
                reason: Error::MissingIdentifier.to_string(),
            });
            continue;
        };

        if !unit.object_references.is_empty() {
            decoded.references.push((identifier, unit.object_references));
        }

        match registry.dispatch(document_type, unit.message_type, unit.payload) {
            Ok(message) => {
                trace!(entry, identifier, message_type = unit.message_type, "decoded object");
                decoded.objects.push((
                    identifier,
                    Object {
                        message_type: unit.message_type,
                        versions: unit.versions,
                        message,
                    },
                ));
            },
            Err(error) => decoded.skipped.push(SkippedObject {
                entry: entry.to_string(),
                identifier: Some(identifier),
                message_type: unit.message_type,
                reason: error.to_string(),
            }),
        }
    }

    decoded
}
