//! IWA Archive Format Parser
//!
//! A decompressed IWA stream is a sequence of records. Each record starts with
//! a varint giving the length of a `TSP.ArchiveInfo` header, followed by the
//! header itself and then, back-to-back, one payload per `TSP.MessageInfo` in
//! the header, each exactly `length` bytes long.
//!
//! ```text
//! +--------+-------------+-----------+-----------+-----+
//! | varint | ArchiveInfo | payload 0 | payload 1 | ... |   (repeated)
//! +--------+-------------+-----------+-----------+-----+
//! ```
//!
//! The header messages below are the wire contract of the upstream format and
//! must not change.

use prost::Message;
use smallvec::SmallVec;

use crate::iwa::varint::{self, VarintError};
use crate::iwa::{Error, Result};

/// Archive information header for one record of an IWA stream
#[derive(Clone, PartialEq, Message)]
pub struct ArchiveInfo {
    /// Unique identifier shared by every message of this record
    #[prost(uint64, optional, tag = "1")]
    pub identifier: Option<u64>,
    /// Descriptors of the payloads that follow the header, in order
    #[prost(message, repeated, tag = "2")]
    pub message_infos: Vec<MessageInfo>,
    #[prost(bool, optional, tag = "3")]
    pub should_merge: Option<bool>,
}

/// Information about a specific message within an archive
#[derive(Clone, PartialEq, Message)]
pub struct MessageInfo {
    /// Message type identifier, the key into the decode tables
    #[prost(uint32, required, tag = "1")]
    pub r#type: u32,
    /// Version information for the message format
    #[prost(uint32, repeated, packed = "true", tag = "2")]
    pub version: Vec<u32>,
    /// Length of the payload in bytes
    #[prost(uint32, required, tag = "3")]
    pub length: u32,
    #[prost(message, repeated, tag = "4")]
    pub field_infos: Vec<FieldInfo>,
    /// Objects referenced from the payload
    #[prost(uint64, repeated, packed = "true", tag = "5")]
    pub object_references: Vec<u64>,
    /// Data (media) entries referenced from the payload
    #[prost(uint64, repeated, packed = "true", tag = "6")]
    pub data_references: Vec<u64>,
}

/// Field introspection data. Decoded for completeness, never interpreted.
#[derive(Clone, PartialEq, Message)]
pub struct FieldInfo {
    #[prost(message, required, tag = "1")]
    pub path: FieldPath,
    #[prost(int32, optional, tag = "2")]
    pub r#type: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub rule: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub unknown_field_rule: Option<i32>,
    #[prost(uint64, repeated, packed = "true", tag = "5")]
    pub object_references: Vec<u64>,
    #[prost(uint64, repeated, packed = "true", tag = "6")]
    pub data_references: Vec<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FieldPath {
    #[prost(uint32, repeated, packed = "true", tag = "1")]
    pub path: Vec<u32>,
}

/// `TSP.Reference`: a pointer to another object by identifier.
///
/// Messages hold references as optional fields; resolve them with
/// [`Index::deref`](crate::iwa::Index::deref).
#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct Reference {
    #[prost(uint64, required, tag = "1")]
    pub identifier: u64,
    #[prost(int32, optional, tag = "2")]
    pub deprecated_type: Option<i32>,
    #[prost(bool, optional, tag = "3")]
    pub deprecated_is_external: Option<bool>,
}

impl Reference {
    pub fn new(identifier: u64) -> Self {
        Self {
            identifier,
            ..Default::default()
        }
    }
}

impl From<u64> for Reference {
    fn from(identifier: u64) -> Self {
        Self::new(identifier)
    }
}

/// One object carved out of the stream, ready for dispatch.
///
/// The payload borrows from the decompressed entry buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectUnit<'a> {
    /// Identifier from the enclosing ArchiveInfo
    pub identifier: Option<u64>,
    pub message_type: u32,
    pub versions: SmallVec<[u32; 4]>,
    pub object_references: Vec<u64>,
    pub payload: &'a [u8],
}

/// Iterator over the object units of one decompressed IWA stream.
///
/// Yields units in stream order. The first structural error is yielded once
/// and ends the iteration.
#[derive(Debug)]
pub struct ObjectStream<'a> {
    data: &'a [u8],
    offset: usize,
    pending: std::vec::IntoIter<ObjectUnit<'a>>,
    failed: bool,
}

impl<'a> ObjectStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            pending: Vec::new().into_iter(),
            failed: false,
        }
    }

    /// Byte offset of the next record header
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Parse one record: the length varint, the ArchiveInfo and its payloads
    fn next_record(&mut self) -> Result<Vec<ObjectUnit<'a>>> {
        let data = self.data;
        let record_start = self.offset;

        let (header_len, consumed) =
            varint::decode_varint(&data[record_start..]).map_err(|e| match e {
                VarintError::Truncated => Error::Truncated {
                    context: "archive info length",
                    offset: record_start,
                },
                VarintError::Overflow => Error::VarintOverflow {
                    offset: record_start,
                },
            })?;

        let header_start = record_start + consumed;
        let header_end = usize::try_from(header_len)
            .ok()
            .and_then(|len| header_start.checked_add(len))
            .filter(|&end| end <= data.len())
            .ok_or(Error::Truncated {
                context: "archive info",
                offset: header_start,
            })?;
        let info = ArchiveInfo::decode(&data[header_start..header_end])?;

        let mut cursor = header_end;
        let mut units = Vec::with_capacity(info.message_infos.len());
        for message_info in info.message_infos {
            let end = cursor
                .checked_add(message_info.length as usize)
                .filter(|&end| end <= data.len())
                .ok_or(Error::Truncated {
                    context: "message payload",
                    offset: cursor,
                })?;

            units.push(ObjectUnit {
                identifier: info.identifier,
                message_type: message_info.r#type,
                versions: SmallVec::from_vec(message_info.version),
                object_references: message_info.object_references,
                payload: &data[cursor..end],
            });
            cursor = end;
        }

        self.offset = cursor;
        Ok(units)
    }
}

impl<'a> Iterator for ObjectStream<'a> {
    type Item = Result<ObjectUnit<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(unit) = self.pending.next() {
                return Some(Ok(unit));
            }
            // A clean end of input is only allowed where a record would start
            if self.failed || self.offset == self.data.len() {
                return None;
            }
            match self.next_record() {
                Ok(units) => self.pending = units.into_iter(),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                },
            }
        }
    }
}

/// Parse every object unit of a stream, failing the whole stream on the first
/// structural error.
pub fn parse_objects(data: &[u8]) -> Result<Vec<ObjectUnit<'_>>> {
    ObjectStream::new(data).collect()
}

/// Collect the message type of every unit without keeping payloads.
///
/// Used for document type detection, which only looks at headers.
pub fn message_types(data: &[u8]) -> Result<Vec<u32>> {
    ObjectStream::new(data)
        .map(|unit| unit.map(|u| u.message_type))
        .collect()
}
