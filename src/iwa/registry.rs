//! Document Type Detection for iWork Applications
//!
//! Pages, Keynote and Numbers share the IWA container and most of their
//! object types, so the application that wrote a document has to be inferred
//! from the message type IDs it contains. Detection runs over the set of
//! distinct type IDs seen so far and evaluates [`DETECTION_RULES`] in order,
//! stopping at the first rule that matches.

use std::fmt;
use std::str::FromStr;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

/// Application type for iWork documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// Apple Keynote
    #[serde(rename = "key")]
    Keynote,
    /// Apple Pages
    #[serde(rename = "pages")]
    Pages,
    /// Apple Numbers
    #[serde(rename = "numbers")]
    Numbers,
}

impl DocumentType {
    /// Every document type, in declaration order
    pub const ALL: [DocumentType; 3] = [Self::Keynote, Self::Pages, Self::Numbers];

    /// Short name, matching the document's file extension
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keynote => "key",
            Self::Pages => "pages",
            Self::Numbers => "numbers",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "key" | "keynote" => Ok(Self::Keynote),
            "pages" => Ok(Self::Pages),
            "numbers" => Ok(Self::Numbers),
            other => Err(format!("unknown document type: {}", other)),
        }
    }
}

/// A test over the set of observed type IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagPredicate {
    /// At least one of the listed IDs was seen
    AnyOf(&'static [u32]),
    /// At least one ID in the inclusive range was seen
    InRange(u32, u32),
}

impl TagPredicate {
    pub fn matches(&self, tags: &RoaringBitmap) -> bool {
        match *self {
            TagPredicate::AnyOf(ids) => ids.iter().any(|&id| tags.contains(id)),
            TagPredicate::InRange(low, high) => (low..=high).any(|id| tags.contains(id)),
        }
    }
}

/// One entry of the ordered detection table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionRule {
    pub predicate: TagPredicate,
    pub document_type: DocumentType,
}

/// Detection rules, evaluated top to bottom.
///
/// Single-ID rules come before the range fallbacks, and the Pages and Numbers
/// checks come before Keynote's range because the ranges overlap across
/// applications. The order is part of the contract.
pub static DETECTION_RULES: [DetectionRule; 5] = [
    // TP.DocumentArchive
    DetectionRule {
        predicate: TagPredicate::AnyOf(&[10000]),
        document_type: DocumentType::Pages,
    },
    // TST.DataStore, TST.TableDataList
    DetectionRule {
        predicate: TagPredicate::AnyOf(&[6001, 6005]),
        document_type: DocumentType::Numbers,
    },
    // KN.SlideArchive
    DetectionRule {
        predicate: TagPredicate::AnyOf(&[5]),
        document_type: DocumentType::Keynote,
    },
    // TST table types
    DetectionRule {
        predicate: TagPredicate::InRange(6000, 6256),
        document_type: DocumentType::Numbers,
    },
    // KN build and transition types
    DetectionRule {
        predicate: TagPredicate::InRange(100, 148),
        document_type: DocumentType::Keynote,
    },
];

/// Evaluate [`DETECTION_RULES`] against a set of type IDs
pub fn detect(tags: &RoaringBitmap) -> Option<DocumentType> {
    DETECTION_RULES
        .iter()
        .find(|rule| rule.predicate.matches(tags))
        .map(|rule| rule.document_type)
}

/// Attempt to determine the document type from a collection of message types
pub fn detect_application(message_type_ids: &[u32]) -> Option<DocumentType> {
    let tags: RoaringBitmap = message_type_ids.iter().copied().collect();
    detect(&tags)
}

/// Accumulates type IDs across entries until a rule matches
#[derive(Debug, Clone, Default)]
pub struct TypeDetector {
    tags: RoaringBitmap,
}

impl TypeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, message_type: u32) {
        self.tags.insert(message_type);
    }

    pub fn observe_all<I: IntoIterator<Item = u32>>(&mut self, message_types: I) {
        self.tags.extend(message_types);
    }

    /// Current verdict over everything observed so far
    pub fn detect(&self) -> Option<DocumentType> {
        detect(&self.tags)
    }

    /// Number of distinct type IDs observed
    pub fn distinct_tags(&self) -> u64 {
        self.tags.len()
    }
}
