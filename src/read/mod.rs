//! Archive reading API for 7z archives.
//!
//! This module provides the public API for reading 7z archives: opening them
//! from a file or any `Read + Seek` source, listing entries, extracting file
//! contents into memory, and verifying integrity.
//!
//! # Example
//!
//! ```rust,ignore
//! use sevenvault::read::Archive;
//!
//! // Open an archive
//! let mut archive = Archive::open_path("archive.7z")?;
//!
//! // List entries
//! for entry in archive.entries() {
//!     println!("{}: {} bytes", entry.path.as_str(), entry.size);
//! }
//!
//! // Extract a single file into memory
//! let data = archive.extract_to_vec("README.md")?;
//! ```

pub(crate) mod entries;
mod entry;
mod info;

mod archive_open;
mod decompression;
mod extraction;

pub use entry::{
    Entry, EntrySelector, SelectAll, SelectByName, SelectByPredicate, SelectFilesOnly,
};
pub use info::{ArchiveInfo, EncryptionInfo, TestResult};

pub(crate) use archive_open::{ExtractionLimits, map_io_error};

use crate::Password;
use crate::format::parser::ArchiveHeader;

/// A 7z archive reader.
///
/// `Archive<R>` wraps a `Read + Seek` source, holding the parsed header and
/// entry list in memory while packed data stays on `reader` until an entry
/// is actually extracted.
pub struct Archive<R> {
    pub(crate) reader: R,
    pub(crate) header: ArchiveHeader,
    pub(crate) entries: Vec<Entry>,
    pub(crate) info: ArchiveInfo,
    /// Password for encrypted entries, set by the `open_*_with_password` constructors.
    pub(crate) password: Option<Password>,
}

impl<R> Archive<R> {
    /// Returns the archive's entries (files and directories).
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns summary information about the archive.
    pub fn info(&self) -> &ArchiveInfo {
        &self.info
    }

    /// Returns the number of entries in the archive.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
