//! Legacy SQLite Object Store
//!
//! Documents written before the IWA format keep every object as a row of an
//! `objects` table whose serialized state lives in `dataStates`. Each row is a
//! complete protobuf payload; there is no chunk framing and no varint stream.

use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use smallvec::SmallVec;

use crate::iwa::Result;
use crate::iwa::archive::ObjectUnit;

const OBJECTS_QUERY: &str = "select o.identifier, o.class, ds.state \
     from objects o join dataStates ds on o.state = ds.identifier";

const CLASS_SAMPLE_QUERY: &str = "select o.class from objects o limit ?1";

/// One stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRow {
    pub identifier: u64,
    /// Message type tag
    pub class: u32,
    /// Protobuf payload
    pub state: Vec<u8>,
}

impl ObjectRow {
    /// The row as a unit for the decode dispatcher. Rows carry no version or
    /// reference lists.
    pub fn as_unit(&self) -> ObjectUnit<'_> {
        ObjectUnit {
            identifier: Some(self.identifier),
            message_type: self.class,
            versions: SmallVec::new(),
            object_references: Vec::new(),
            payload: &self.state,
        }
    }
}

/// A read-only connection to a legacy `index.db`
pub struct Database {
    connection: Connection,
    path: PathBuf,
}

impl Database {
    /// Open the database read-only and make sure it really is SQLite.
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        // Opening is lazy; touching the schema reads the file header
        connection.query_row("select count(*) from sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })?;

        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Type tags of the first `limit` objects, for document type detection.
    ///
    /// Rows whose class cannot be read as a type tag are ignored.
    pub fn sample_classes(&self, limit: u32) -> Result<Vec<u32>> {
        let mut statement = self.connection.prepare(CLASS_SAMPLE_QUERY)?;
        let classes = statement
            .query_map([limit], |row| row.get::<_, u32>(0))?
            .filter_map(|class| class.ok())
            .collect();
        Ok(classes)
    }

    /// Every stored object with its payload, in query order
    pub fn objects(&self) -> Result<Vec<ObjectRow>> {
        let mut statement = self.connection.prepare(OBJECTS_QUERY)?;
        let rows = statement.query_map([], |row| {
            let identifier: i64 = row.get(0)?;
            Ok(ObjectRow {
                identifier: u64::try_from(identifier)
                    .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(0, identifier))?,
                class: row.get(1)?,
                state: row.get(2)?,
            })
        })?;

        let mut objects = Vec::new();
        for row in rows {
            objects.push(row?);
        }
        Ok(objects)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}
