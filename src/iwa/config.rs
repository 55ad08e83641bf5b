//! Configuration for loading iWork documents.
//!
//! [`LoadOptions`] controls where the loader looks for archives inside a
//! bundle, how it reacts to entries that cannot be decoded, and whether entries
//! are decoded in parallel.

/// Configuration options for [`Index`](crate::iwa::Index) loading.
///
/// # Examples
///
/// ```rust
/// use iwork_index::iwa::{EntryFailurePolicy, LoadOptions};
///
/// // Create with defaults
/// let options = LoadOptions::default();
///
/// // Or customize
/// let options = LoadOptions::new()
///     .with_entry_failure(EntryFailurePolicy::Abort)
///     .with_parallel(false);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// What to do when an entry's framing or object stream is corrupt
    pub entry_failure: EntryFailurePolicy,
    /// Decode entries on the rayon thread pool
    pub parallel: bool,
    /// Name of the archive inside a bundle directory
    pub index_archive: String,
    /// Name of the legacy SQLite index inside a bundle directory
    pub database_file: String,
    /// Suffix of the archive members that hold object streams
    pub entry_extension: String,
    /// How many database rows the type detector samples
    pub detection_row_limit: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            entry_failure: EntryFailurePolicy::Skip,
            parallel: true,
            index_archive: "Index.zip".to_string(),
            database_file: "index.db".to_string(),
            entry_extension: ".iwa".to_string(),
            detection_row_limit: 100,
        }
    }
}

impl LoadOptions {
    /// Create a new `LoadOptions` with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how entry-level failures are handled.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use iwork_index::iwa::{EntryFailurePolicy, LoadOptions};
    ///
    /// let options = LoadOptions::new().with_entry_failure(EntryFailurePolicy::Abort);
    /// ```
    #[inline]
    pub fn with_entry_failure(mut self, policy: EntryFailurePolicy) -> Self {
        self.entry_failure = policy;
        self
    }

    /// Set whether entries are decoded in parallel.
    ///
    /// Results are merged in entry order either way, so the final index is the
    /// same.
    #[inline]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[inline]
    pub fn with_index_archive(mut self, name: impl Into<String>) -> Self {
        self.index_archive = name.into();
        self
    }

    #[inline]
    pub fn with_database_file(mut self, name: impl Into<String>) -> Self {
        self.database_file = name.into();
        self
    }

    #[inline]
    pub fn with_entry_extension(mut self, extension: impl Into<String>) -> Self {
        self.entry_extension = extension.into();
        self
    }

    /// Set how many database rows are sampled for type detection.
    #[inline]
    pub fn with_detection_row_limit(mut self, limit: u32) -> Self {
        self.detection_row_limit = limit;
        self
    }

    /// Whether an archive member holds an object stream
    pub fn is_entry(&self, name: &str) -> bool {
        name.ends_with(self.entry_extension.as_str())
    }
}

/// Reaction to an entry whose chunk framing or object stream is corrupt.
///
/// Object-level failures (unknown type, bad payload) never abort loading;
/// this only governs failures that make a whole entry unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryFailurePolicy {
    /// Drop the entry's objects, record the failure and keep loading
    #[default]
    Skip,
    /// Fail the whole load with [`Error::Entry`](crate::iwa::Error::Entry)
    Abort,
}
