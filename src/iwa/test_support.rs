//! Fixture builders shared by the unit tests.
//!
//! Streams are assembled the way iWork writes them: prost-encoded headers
//! behind varint lengths, Snappy blocks behind 4-byte chunk headers, and the
//! result stored in a zip archive.

use std::io::{Cursor, Write};

use phf::phf_map;
use prost::Message;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::iwa::archive::{ArchiveInfo, MessageInfo, Reference};
use crate::iwa::bundle::Entry;
use crate::iwa::protobuf::{DecodeFn, DecoderRegistry, decode_as};
use crate::iwa::varint::encode_varint;

/// A payload that no message in this module accepts: a string field whose
/// declared length runs past the end.
pub const MALFORMED_PAYLOAD: [u8; 3] = [0x0A, 0x05, b'a'];

#[derive(Clone, PartialEq, Message)]
pub struct SlideArchive {
    #[prost(string, optional, tag = "1")]
    pub title: Option<String>,
    #[prost(message, optional, tag = "2")]
    pub note: Option<Reference>,
    #[prost(message, repeated, tag = "3")]
    pub drawables: Vec<Reference>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ShowArchive {
    #[prost(message, repeated, tag = "1")]
    pub slides: Vec<Reference>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NoteArchive {
    #[prost(string, optional, tag = "1")]
    pub text: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PagesDocumentArchive {
    #[prost(message, optional, tag = "1")]
    pub body: Option<Reference>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TableModelArchive {
    #[prost(string, optional, tag = "1")]
    pub table_name: Option<String>,
    #[prost(uint32, optional, tag = "2")]
    pub number_of_rows: Option<u32>,
}

static KEYNOTE: phf::Map<u32, DecodeFn> = phf_map! {
    2u32 => decode_as::<ShowArchive>,
    5u32 => decode_as::<SlideArchive>,
    15u32 => decode_as::<NoteArchive>,
};

static PAGES: phf::Map<u32, DecodeFn> = phf_map! {
    10000u32 => decode_as::<PagesDocumentArchive>,
};

static NUMBERS: phf::Map<u32, DecodeFn> = phf_map! {
    6000u32 => decode_as::<TableModelArchive>,
    6001u32 => decode_as::<TableModelArchive>,
};

/// Registry over the fixture schemas above
pub fn registry() -> DecoderRegistry {
    DecoderRegistry::new(&KEYNOTE, &PAGES, &NUMBERS)
}

/// Frame each slice as one compressed chunk
pub fn frame(chunks: &[&[u8]]) -> Vec<u8> {
    let mut encoder = snap::raw::Encoder::new();
    let mut framed = Vec::new();
    for chunk in chunks {
        let block = encoder.compress_vec(chunk).expect("snappy compression");
        let len = u32::try_from(block.len()).expect("block fits in 24 bits");
        framed.push(0);
        framed.extend_from_slice(&len.to_le_bytes()[..3]);
        framed.extend_from_slice(&block);
    }
    framed
}

/// Builds decompressed object streams record by record
#[derive(Debug, Default)]
pub struct StreamBuilder {
    data: Vec<u8>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// One record holding a single object
    pub fn object(self, identifier: u64, message_type: u32, payload: &[u8]) -> Self {
        self.batch(Some(identifier), &[(message_type, payload.to_vec())])
    }

    /// One record holding several messages under the same identifier
    pub fn batch(mut self, identifier: Option<u64>, messages: &[(u32, Vec<u8>)]) -> Self {
        let info = ArchiveInfo {
            identifier,
            message_infos: messages
                .iter()
                .map(|(message_type, payload)| MessageInfo {
                    r#type: *message_type,
                    length: payload.len() as u32,
                    ..Default::default()
                })
                .collect(),
            should_merge: None,
        };
        self.push_record(&info);
        for (_, payload) in messages {
            self.data.extend_from_slice(payload);
        }
        self
    }

    /// One record with a caller-built MessageInfo; its length is filled in
    pub fn message(
        mut self,
        identifier: Option<u64>,
        mut info: MessageInfo,
        payload: &[u8],
    ) -> Self {
        info.length = payload.len() as u32;
        let header = ArchiveInfo {
            identifier,
            message_infos: vec![info],
            should_merge: None,
        };
        self.push_record(&header);
        self.data.extend_from_slice(payload);
        self
    }

    fn push_record(&mut self, info: &ArchiveInfo) {
        let header = info.encode_to_vec();
        self.data.extend(encode_varint(header.len() as u64));
        self.data.extend(header);
    }

    /// The decompressed stream
    pub fn build(self) -> Vec<u8> {
        self.data
    }

    /// The stream as a chunk-framed `.iwa` entry body
    pub fn framed(self) -> Vec<u8> {
        frame(&[self.data.as_slice()])
    }
}

/// An entry holding one framed stream
pub fn entry(name: &str, stream: StreamBuilder) -> Entry {
    Entry {
        name: name.to_string(),
        data: stream.framed(),
    }
}

/// Store the given members in an in-memory zip, alternating stored and
/// deflated compression
pub fn zip_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (position, (name, data)) in members.iter().enumerate() {
        let method = if position % 2 == 0 {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        let options = SimpleFileOptions::default().compression_method(method);
        writer.start_file(*name, options).expect("start zip member");
        writer.write_all(data).expect("write zip member");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Flip the last byte of a stored member's data so its checksum no longer
/// matches
pub fn corrupt_member(zip: &mut [u8], stored_data: &[u8]) {
    let position = zip
        .windows(stored_data.len())
        .position(|window| window == stored_data)
        .expect("stored member data present verbatim");
    zip[position + stored_data.len() - 1] ^= 0xff;
}

/// Zip bytes for a list of entries
pub fn zip_entries(entries: &[Entry]) -> Vec<u8> {
    let members: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|entry| (entry.name.as_str(), entry.data.as_slice()))
        .collect();
    zip_bytes(&members)
}

/// A small Keynote document: a show, a slide pointing at a note, and the note
pub fn keynote_entries() -> Vec<Entry> {
    let slide = SlideArchive {
        title: Some("Welcome".to_string()),
        note: Some(Reference::new(30)),
        drawables: Vec::new(),
    };
    let note = NoteArchive {
        text: Some("Say hello".to_string()),
    };
    let show = ShowArchive {
        slides: vec![Reference::new(20)],
    };

    vec![
        entry(
            "Index/Document.iwa",
            StreamBuilder::new().message(
                Some(1),
                MessageInfo {
                    r#type: 2,
                    object_references: vec![20],
                    ..Default::default()
                },
                &show.encode_to_vec(),
            ),
        ),
        entry(
            "Index/Slide.iwa",
            StreamBuilder::new()
                .message(
                    Some(20),
                    MessageInfo {
                        r#type: 5,
                        version: vec![1, 0, 5],
                        object_references: vec![30],
                        ..Default::default()
                    },
                    &slide.encode_to_vec(),
                )
                .object(30, 15, &note.encode_to_vec()),
        ),
    ]
}

/// Install a test subscriber so warnings show up in failing test output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
