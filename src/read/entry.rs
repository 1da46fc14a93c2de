//! Archive entry types and selectors.

use crate::ArchivePath;
use crate::timestamp::Timestamp;

/// An entry in a 7z archive.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future versions without breaking downstream code. Pattern matching
/// on `Entry` requires a `..` wildcard.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Entry {
    /// The path within the archive.
    pub path: ArchivePath,
    /// Whether this entry is a directory.
    pub is_directory: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// CRC-32 checksum of the entry's uncompressed data.
    ///
    /// This is the standard checksum format used in 7z archives.
    ///
    /// # When this is `None`
    ///
    /// - **Directories**: Have no content to checksum
    /// - **Empty files**: May not have a stored CRC
    /// - **Archive without CRCs**: Some 7z archives omit CRC storage
    /// - **Solid archives**: CRCs may be stored per-block rather than per-file
    pub crc32: Option<u32>,
    /// Modification time as Windows FILETIME (100-nanosecond intervals since 1601-01-01).
    ///
    /// Use [`modification_timestamp()`](Self::modification_timestamp) to get a [`Timestamp`]
    /// with convenient conversion methods, or [`modified()`](Self::modified) for `SystemTime`.
    pub modification_time: Option<u64>,
    /// Creation time as Windows FILETIME (100-nanosecond intervals since 1601-01-01).
    ///
    /// Use [`creation_timestamp()`](Self::creation_timestamp) to get a [`Timestamp`]
    /// with convenient conversion methods, or [`created()`](Self::created) for `SystemTime`.
    pub creation_time: Option<u64>,
    /// Access time as Windows FILETIME (100-nanosecond intervals since 1601-01-01).
    ///
    /// Use [`access_timestamp()`](Self::access_timestamp) to get a [`Timestamp`]
    /// with convenient conversion methods, or [`accessed()`](Self::accessed) for `SystemTime`.
    pub access_time: Option<u64>,
    /// Windows file attributes.
    pub attributes: Option<u32>,
    /// Whether this entry is encrypted.
    pub is_encrypted: bool,
    /// Whether this is an anti-item (marks file for deletion in incremental backups).
    pub is_anti: bool,
    /// Index in the internal entry list.
    #[allow(dead_code)] // Used for internal tracking
    pub(crate) index: usize,
    /// Folder index for solid archives.
    pub(crate) folder_index: Option<usize>,
    /// Stream index within folder.
    pub(crate) stream_index: Option<usize>,
}

impl Entry {
    /// Returns the file name (last component of the path).
    pub fn name(&self) -> &str {
        self.path.file_name()
    }

    /// Returns true if this is a file (not a directory).
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }

    /// Returns the modification time as a SystemTime (if available).
    ///
    /// For higher precision access, use [`modification_timestamp()`](Self::modification_timestamp).
    pub fn modified(&self) -> Option<std::time::SystemTime> {
        self.modification_time
            .map(|ft| Timestamp::from_filetime(ft).as_system_time())
    }

    /// Returns the creation time as a SystemTime (if available).
    ///
    /// For higher precision access, use [`creation_timestamp()`](Self::creation_timestamp).
    pub fn created(&self) -> Option<std::time::SystemTime> {
        self.creation_time
            .map(|ft| Timestamp::from_filetime(ft).as_system_time())
    }

    /// Returns the access time as a SystemTime (if available).
    ///
    /// For higher precision access, use [`access_timestamp()`](Self::access_timestamp).
    pub fn accessed(&self) -> Option<std::time::SystemTime> {
        self.access_time
            .map(|ft| Timestamp::from_filetime(ft).as_system_time())
    }

    /// Returns the modification timestamp with full 100-nanosecond precision.
    ///
    /// The [`Timestamp`] type provides access to the raw FILETIME value and
    /// various conversion methods while preserving maximum precision.
    pub fn modification_timestamp(&self) -> Option<Timestamp> {
        self.modification_time.map(Timestamp::from_filetime)
    }

    /// Returns the creation timestamp with full 100-nanosecond precision.
    ///
    /// The [`Timestamp`] type provides access to the raw FILETIME value and
    /// various conversion methods while preserving maximum precision.
    pub fn creation_timestamp(&self) -> Option<Timestamp> {
        self.creation_time.map(Timestamp::from_filetime)
    }

    /// Returns the access timestamp with full 100-nanosecond precision.
    ///
    /// The [`Timestamp`] type provides access to the raw FILETIME value and
    /// various conversion methods while preserving maximum precision.
    pub fn access_timestamp(&self) -> Option<Timestamp> {
        self.access_time.map(Timestamp::from_filetime)
    }
}

/// A selector for filtering entries during in-memory extraction or testing.
///
/// # Built-in Implementations
///
/// | Type | Behavior |
/// |------|----------|
/// | `()` | Selects all entries (most concise) |
/// | [`SelectAll`] | Selects all entries (explicit) |
/// | `&[&str]` | Selects entries matching any of the paths |
/// | `Vec<String>` | Selects entries matching any of the paths |
/// | `Fn(&Entry) -> bool` | Custom predicate function |
/// | [`SelectByName`] | Selects by exact path match |
/// | [`SelectByPredicate`] | Wraps a predicate closure |
/// | [`SelectFilesOnly`] | Selects only files (excludes directories) |
///
/// # Example
///
/// ```rust,ignore
/// let matches: Vec<_> = archive.entries().iter().filter(|e| selector.select(e)).collect();
/// ```
pub trait EntrySelector {
    /// Returns true if the entry should be selected.
    fn select(&self, entry: &Entry) -> bool;
}

/// Selector that matches all entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectAll;

impl EntrySelector for SelectAll {
    fn select(&self, _entry: &Entry) -> bool {
        true
    }
}

/// Selector that matches entries by exact names.
#[derive(Debug, Clone)]
pub struct SelectByName {
    names: Vec<String>,
}

impl SelectByName {
    /// Creates a selector for the given names.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl EntrySelector for SelectByName {
    fn select(&self, entry: &Entry) -> bool {
        self.names.iter().any(|name| entry.path.as_str() == name)
    }
}

/// Selector that matches entries by a predicate function.
pub struct SelectByPredicate<F> {
    predicate: F,
}

impl<F: Fn(&Entry) -> bool> SelectByPredicate<F> {
    /// Creates a selector with the given predicate.
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F: Fn(&Entry) -> bool> EntrySelector for SelectByPredicate<F> {
    fn select(&self, entry: &Entry) -> bool {
        (self.predicate)(entry)
    }
}

/// Selector that matches only files (not directories).
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectFilesOnly;

impl EntrySelector for SelectFilesOnly {
    fn select(&self, entry: &Entry) -> bool {
        entry.is_file()
    }
}

/// The unit type `()` implements `EntrySelector` to select all entries.
///
/// This is the most concise way to select every entry without naming a type.
impl EntrySelector for () {
    fn select(&self, _entry: &Entry) -> bool {
        true
    }
}

// Implement for closures
impl<F: Fn(&Entry) -> bool> EntrySelector for F {
    fn select(&self, entry: &Entry) -> bool {
        self(entry)
    }
}

// Implement for slice of strings
impl EntrySelector for &[&str] {
    fn select(&self, entry: &Entry) -> bool {
        self.iter().any(|name| entry.path.as_str() == *name)
    }
}

// Implement for Vec of strings
impl EntrySelector for Vec<String> {
    fn select(&self, entry: &Entry) -> bool {
        self.iter().any(|name| entry.path.as_str() == name)
    }
}
