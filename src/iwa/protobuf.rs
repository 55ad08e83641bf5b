//! Protobuf Message Dispatch for iWork IWA Files
//!
//! Every object payload is a protobuf message whose schema is selected by the
//! pair (document type, message type ID). The tables mapping IDs to decode
//! functions are generated outside this crate from the applications' embedded
//! descriptors and handed in through a [`DecoderRegistry`]:
//!
//! ```rust,ignore
//! use phf::phf_map;
//! use iwork_index::iwa::{DecodeFn, DecoderRegistry, decode_as};
//!
//! static KEYNOTE: phf::Map<u32, DecodeFn> = phf_map! {
//!     2u32 => decode_as::<kn::ShowArchive>,
//!     5u32 => decode_as::<kn::SlideArchive>,
//! };
//!
//! let registry = DecoderRegistry::new(&KEYNOTE, &PAGES, &NUMBERS);
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use prost::Message;

use crate::iwa::registry::DocumentType;
use crate::iwa::{Error, Result};

/// Decode function for one message type
pub type DecodeFn =
    fn(&[u8]) -> std::result::Result<Box<dyn DecodedMessage>, prost::DecodeError>;

/// Decode a payload as message `M`.
///
/// Instantiations coerce to [`DecodeFn`], so a generated table entry is just
/// `decode_as::<SomeArchive>`.
pub fn decode_as<M>(
    data: &[u8],
) -> std::result::Result<Box<dyn DecodedMessage>, prost::DecodeError>
where
    M: Message + Default + fmt::Debug + 'static,
{
    Ok(Box::new(M::decode(data)?))
}

/// Trait for decoded iWork messages.
///
/// Implemented for every prost message. Consumers recover the concrete type
/// with [`downcast_ref`](trait.DecodedMessage.html#method.downcast_ref).
pub trait DecodedMessage: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<M: Message + fmt::Debug + 'static> DecodedMessage for M {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn DecodedMessage {
    /// The message as `T`, if that is its concrete type
    pub fn downcast_ref<T: DecodedMessage>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: DecodedMessage>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A read-only mapping from message type ID to decode function
pub trait DecodeTable: Send + Sync {
    fn decoder(&self, message_type: u32) -> Option<DecodeFn>;

    /// Number of message types the table can decode
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecodeTable for phf::Map<u32, DecodeFn> {
    fn decoder(&self, message_type: u32) -> Option<DecodeFn> {
        self.get(&message_type).copied()
    }

    fn len(&self) -> usize {
        phf::Map::len(self)
    }
}

impl DecodeTable for HashMap<u32, DecodeFn> {
    fn decoder(&self, message_type: u32) -> Option<DecodeFn> {
        self.get(&message_type).copied()
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }
}

/// Empty table used by [`DecoderRegistry::empty`]
struct NoDecoders;

impl DecodeTable for NoDecoders {
    fn decoder(&self, _message_type: u32) -> Option<DecodeFn> {
        None
    }

    fn len(&self) -> usize {
        0
    }
}

static NO_DECODERS: NoDecoders = NoDecoders;

/// One decode table per document type, chosen once the type is known.
///
/// Registries are plain values; several can coexist, e.g. a real one and a
/// mock one under test.
#[derive(Clone, Copy)]
pub struct DecoderRegistry {
    keynote: &'static dyn DecodeTable,
    pages: &'static dyn DecodeTable,
    numbers: &'static dyn DecodeTable,
}

impl DecoderRegistry {
    pub fn new(
        keynote: &'static dyn DecodeTable,
        pages: &'static dyn DecodeTable,
        numbers: &'static dyn DecodeTable,
    ) -> Self {
        Self {
            keynote,
            pages,
            numbers,
        }
    }

    /// A registry that decodes nothing. Loading with it still detects the
    /// document type and builds the reference graph.
    pub fn empty() -> Self {
        Self::new(&NO_DECODERS, &NO_DECODERS, &NO_DECODERS)
    }

    /// Table for a document type
    pub fn table(&self, document_type: DocumentType) -> &'static dyn DecodeTable {
        match document_type {
            DocumentType::Keynote => self.keynote,
            DocumentType::Pages => self.pages,
            DocumentType::Numbers => self.numbers,
        }
    }

    /// Decode a message of the given type using the table for `document_type`
    pub fn dispatch(
        &self,
        document_type: DocumentType,
        message_type: u32,
        data: &[u8],
    ) -> Result<Box<dyn DecodedMessage>> {
        let decoder = self
            .table(document_type)
            .decoder(message_type)
            .ok_or(Error::UnsupportedMessageType {
                document_type,
                message_type,
            })?;
        Ok(decoder(data)?)
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("keynote", &self.keynote.len())
            .field("pages", &self.pages.len())
            .field("numbers", &self.numbers.len())
            .finish()
    }
}
