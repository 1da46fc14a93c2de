//! Files info structures for 7z archives.
//!
//! These structures describe the file entries within an archive.

use crate::{Error, Result};
use std::io::Read;

use super::property_id;
use super::reader::{
    read_all_or_bits, read_bool_vector, read_bytes, read_u8, read_u32_le, read_u64_le,
    read_variable_u64,
};
use super::streams::ResourceLimits;

/// A single file entry in the archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveEntry {
    /// File name (path within the archive).
    pub name: String,
    /// Whether this is a directory.
    pub is_directory: bool,
    /// Whether this is an anti-item (for incremental backups).
    pub is_anti: bool,
    /// Whether this entry has an associated data stream.
    pub has_stream: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// CRC32 checksum of uncompressed data.
    pub crc: Option<u32>,
    /// Creation time (Windows FILETIME, 100ns intervals since 1601-01-01).
    pub ctime: Option<u64>,
    /// Last access time (Windows FILETIME).
    pub atime: Option<u64>,
    /// Last modification time (Windows FILETIME).
    pub mtime: Option<u64>,
    /// Windows file attributes.
    pub attributes: Option<u32>,
}

impl ArchiveEntry {
    /// Returns true if this entry represents a file (not a directory).
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }
}

/// Files info from the archive header.
#[derive(Debug, Clone, Default)]
pub struct FilesInfo {
    /// List of file entries.
    pub entries: Vec<ArchiveEntry>,
    /// Archive comment (if any).
    pub comment: Option<String>,
}

impl FilesInfo {
    /// Parses FilesInfo from a reader.
    ///
    /// The reader should be positioned after the K_FILES_INFO property ID.
    ///
    /// # Arguments
    ///
    /// * `r` - The reader
    /// * `unpack_sizes` - Sizes for each file with data
    /// * `digests` - CRC values for each file with data
    /// * `limits` - Resource limits
    pub fn parse<R: Read>(
        r: &mut R,
        unpack_sizes: &[u64],
        digests: &[Option<u32>],
        limits: &ResourceLimits,
    ) -> Result<Self> {
        let num_files = read_variable_u64(r)?;

        if num_files > limits.max_entries as u64 {
            return Err(Error::ResourceLimitExceeded(format!(
                "too many files: {}",
                num_files
            )));
        }

        let num_files = num_files as usize;
        let mut entries: Vec<ArchiveEntry> =
            (0..num_files).map(|_| ArchiveEntry::default()).collect();

        // Track which files have streams
        let mut empty_streams = vec![false; num_files];
        let mut empty_files = Vec::new();
        let mut anti_items = Vec::new();
        let mut comment: Option<String> = None;

        loop {
            let prop_id = read_u8(r)?;

            if prop_id == property_id::END {
                break;
            }

            let prop_size = read_variable_u64(r)?;

            match prop_id {
                property_id::NAME => {
                    // External flag
                    let external = read_u8(r)?;
                    if external != 0 {
                        return Err(Error::Unsupported("external file names".into()));
                    }

                    // Read names as UTF-16LE null-terminated strings
                    for entry in &mut entries {
                        entry.name = read_utf16le_string(r)?;
                    }
                }

                property_id::EMPTY_STREAM => {
                    empty_streams = read_bool_vector(r, num_files)?;
                }

                property_id::EMPTY_FILE => {
                    let num_empty = empty_streams.iter().filter(|&&x| x).count();
                    empty_files = read_bool_vector(r, num_empty)?;
                }

                property_id::ANTI => {
                    let num_empty = empty_streams.iter().filter(|&&x| x).count();
                    anti_items = read_bool_vector(r, num_empty)?;
                }

                property_id::CTIME => {
                    parse_timestamps(r, &mut entries, |e, t| e.ctime = Some(t))?;
                }

                property_id::ATIME => {
                    parse_timestamps(r, &mut entries, |e, t| e.atime = Some(t))?;
                }

                property_id::MTIME => {
                    parse_timestamps(r, &mut entries, |e, t| e.mtime = Some(t))?;
                }

                property_id::WIN_ATTRIBUTES => {
                    parse_attributes(r, &mut entries)?;
                }

                property_id::COMMENT => {
                    // Read comment as UTF-16LE string
                    // The format is: external flag (1 byte) + UTF-16LE null-terminated string
                    let external = read_u8(r)?;
                    if external != 0 {
                        return Err(Error::Unsupported("external comments".into()));
                    }
                    comment = Some(read_utf16le_string(r)?);
                }

                _ => {
                    // Skip unknown property
                    let _ = read_bytes(r, prop_size as usize)?;
                }
            }
        }

        // Process empty stream info
        let mut empty_idx = 0;
        for (i, &is_empty_stream) in empty_streams.iter().enumerate() {
            if is_empty_stream {
                entries[i].has_stream = false;

                // Check if it's a directory (not in empty_files) or anti-item
                if !empty_files.is_empty() && empty_idx < empty_files.len() {
                    entries[i].is_directory = !empty_files[empty_idx];
                } else {
                    entries[i].is_directory = true;
                }

                if !anti_items.is_empty() && empty_idx < anti_items.len() {
                    entries[i].is_anti = anti_items[empty_idx];
                }

                empty_idx += 1;
            } else {
                entries[i].has_stream = true;
            }
        }

        // Assign sizes and CRCs from substreams info
        let mut stream_idx = 0;
        for entry in &mut entries {
            if entry.has_stream {
                if stream_idx < unpack_sizes.len() {
                    entry.size = unpack_sizes[stream_idx];
                }
                if stream_idx < digests.len() {
                    entry.crc = digests[stream_idx];
                }
                stream_idx += 1;
            }
        }

        Ok(Self { entries, comment })
    }

    /// Returns the number of files.
    pub fn num_files(&self) -> usize {
        self.entries.len()
    }

    /// Returns the archive comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Returns entries that have data streams (non-empty files).
    pub fn files_with_streams(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter().filter(|e| e.has_stream)
    }

    /// Returns directory entries.
    pub fn directories(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter().filter(|e| e.is_directory)
    }

    /// Returns anti-item entries (marked for deletion in incremental backups).
    ///
    /// Anti-items indicate files that should be removed when applying
    /// this archive as an incremental update.
    pub fn anti_items(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter().filter(|e| e.is_anti)
    }

    /// Returns the number of anti-items.
    pub fn num_anti_items(&self) -> usize {
        self.entries.iter().filter(|e| e.is_anti).count()
    }
}

/// Maximum length for UTF-16LE strings read from archives (in code units).
///
/// This limit prevents denial-of-service attacks where a malicious archive
/// specifies an extremely long file name. 32,768 UTF-16 code units allows
/// for paths up to 65KB which far exceeds any reasonable file system path.
const MAX_UTF16_STRING_LENGTH: usize = 32768;

/// Reads a UTF-16LE null-terminated string.
fn read_utf16le_string<R: Read>(r: &mut R) -> Result<String> {
    let mut chars = Vec::new();

    loop {
        let mut buf = [0u8; 2];
        r.read_exact(&mut buf)?;
        let code_unit = u16::from_le_bytes(buf);

        if code_unit == 0 {
            break;
        }

        if chars.len() >= MAX_UTF16_STRING_LENGTH {
            return Err(Error::ResourceLimitExceeded(format!(
                "UTF-16 string exceeds maximum length of {} code units",
                MAX_UTF16_STRING_LENGTH
            )));
        }

        chars.push(code_unit);
    }

    String::from_utf16(&chars).map_err(|_| Error::Malformed("invalid UTF-16 file name".into()))
}

/// Parses timestamps for entries.
fn parse_timestamps<R: Read, F>(
    r: &mut R,
    entries: &mut [ArchiveEntry],
    mut setter: F,
) -> Result<()>
where
    F: FnMut(&mut ArchiveEntry, u64),
{
    let defined = read_all_or_bits(r, entries.len())?;

    // External flag
    let external = read_u8(r)?;
    if external != 0 {
        return Err(Error::Unsupported("external timestamps".into()));
    }

    for (entry, &has_time) in entries.iter_mut().zip(defined.iter()) {
        if has_time {
            let timestamp = read_u64_le(r)?;
            setter(entry, timestamp);
        }
    }

    Ok(())
}

/// Parses Windows attributes for entries.
fn parse_attributes<R: Read>(r: &mut R, entries: &mut [ArchiveEntry]) -> Result<()> {
    let defined = read_all_or_bits(r, entries.len())?;

    // External flag
    let external = read_u8(r)?;
    if external != 0 {
        return Err(Error::Unsupported("external attributes".into()));
    }

    for (entry, &has_attr) in entries.iter_mut().zip(defined.iter()) {
        if has_attr {
            entry.attributes = Some(read_u32_le(r)?);
        }
    }

    Ok(())
}
