//! In-memory extraction of entries from archives.
//!
//! The reader only ever hands back owned bytes for an entry; it never writes
//! to the filesystem itself. Callers that want files on disk write the
//! returned `Vec<u8>` (or stream from [`Archive::extract_entry_to_writer_by_index`])
//! wherever they like.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::codec;
use crate::format::SIGNATURE_HEADER_SIZE;
use crate::format::streams::Folder;
use crate::{Error, READ_BUFFER_SIZE, Result};

use super::{Archive, EntrySelector, ExtractionLimits, TestResult};

impl<R: Read + Seek> Archive<R> {
    /// Extracts an entry by archive path to a `Vec<u8>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is not found, is a directory, or
    /// decompression/integrity verification fails.
    pub fn extract_to_vec(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry_idx = self
            .entries
            .iter()
            .position(|e| e.path.as_str() == name)
            .ok_or_else(|| Error::Malformed(format!("entry not found: {}", name)))?;

        self.extract_entry_to_vec_by_index(entry_idx)
    }

    /// Extracts an entry by index to a `Vec<u8>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IntegrityFailure`] if the entry's CRC-32 doesn't match
    /// the decompressed data.
    pub fn extract_entry_to_vec_by_index(&mut self, entry_idx: usize) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(entry_idx)
            .ok_or_else(|| Error::Malformed(format!("entry index {} out of range", entry_idx)))?;

        if entry.is_directory {
            return Err(Error::Malformed("cannot extract a directory".into()));
        }

        // Empty files have no folder assignment at all.
        if entry.size == 0 && entry.folder_index.is_none() {
            return Ok(Vec::new());
        }

        let entry_path = entry.path.as_str().to_string();
        let entry_size = entry.size;
        let entry_crc = entry.crc32;
        let folder_idx = entry
            .folder_index
            .ok_or_else(|| Error::Malformed("entry has no folder index".into()))?;
        let stream_index = entry.stream_index;

        let folder = self.folder(folder_idx)?.clone();

        let limits = ExtractionLimits::unlimited();
        let mut output = Vec::with_capacity(entry_size as usize);
        self.extract_single_stream(
            &folder,
            folder_idx,
            stream_index,
            entry_size,
            &mut output,
            &limits,
        )?;

        if let Some(expected_crc) = entry_crc {
            let actual_crc = crc32fast::hash(&output);
            if actual_crc != expected_crc {
                return Err(Error::integrity_failure(
                    entry_idx,
                    Some(entry_path),
                    expected_crc,
                    actual_crc,
                ));
            }
        }

        Ok(output)
    }

    /// Extracts an entry to a writer, returning the number of bytes written.
    pub fn extract_entry_to_writer_by_index<W: Write + ?Sized>(
        &mut self,
        entry_idx: usize,
        writer: &mut W,
    ) -> Result<u64> {
        let data = self.extract_entry_to_vec_by_index(entry_idx)?;
        writer.write_all(&data).map_err(Error::Io)?;
        Ok(data.len() as u64)
    }

    /// Verifies the integrity (CRC-32) of every entry matched by `selector`,
    /// without keeping the decompressed data around.
    ///
    /// This decompresses each matched entry exactly like
    /// [`extract_entry_to_vec_by_index`](Self::extract_entry_to_vec_by_index),
    /// but discards the bytes once the checksum has been verified.
    pub fn test_entries(&mut self, selector: impl EntrySelector) -> Result<TestResult> {
        let mut result = TestResult::default();

        let indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_directory && selector.select(e))
            .map(|(idx, _)| idx)
            .collect();

        for idx in indices {
            result.entries_tested += 1;
            match self.extract_entry_to_vec_by_index(idx) {
                Ok(_) => result.entries_passed += 1,
                Err(e) => {
                    result.entries_failed += 1;
                    let path = self.entries[idx].path.as_str().to_string();
                    result.failures.push((path, e.to_string()));
                }
            }
        }

        Ok(result)
    }

    /// Returns the folder at `folder_idx`, or an error if the header has no
    /// unpack info or the index is out of range.
    fn folder(&self, folder_idx: usize) -> Result<&Folder> {
        self.header
            .unpack_info
            .as_ref()
            .ok_or_else(|| Error::Malformed("missing unpack info".into()))?
            .folders
            .get(folder_idx)
            .ok_or_else(|| Error::Malformed(format!("folder index {} out of range", folder_idx)))
    }

    /// Returns true if `folder_idx` packs more than one entry (a solid block).
    pub(crate) fn is_solid_block(&self, folder_idx: usize) -> bool {
        self.header
            .substreams_info
            .as_ref()
            .and_then(|ss| ss.num_unpack_streams_in_folders.get(folder_idx))
            .map(|&count| count > 1)
            .unwrap_or(false)
    }

    /// Returns the uncompressed size of each entry packed into `folder_idx`,
    /// in storage order.
    pub(crate) fn get_solid_block_entry_sizes(&self, folder_idx: usize) -> Result<Vec<u64>> {
        let substreams = self
            .header
            .substreams_info
            .as_ref()
            .ok_or_else(|| Error::Malformed("missing substreams info".into()))?;

        let start: usize = substreams.num_unpack_streams_in_folders[..folder_idx]
            .iter()
            .map(|&n| n as usize)
            .sum();
        let count = substreams
            .num_unpack_streams_in_folders
            .get(folder_idx)
            .copied()
            .unwrap_or(0) as usize;

        substreams
            .unpack_sizes
            .get(start..start + count)
            .map(<[u64]>::to_vec)
            .ok_or_else(|| Error::Malformed("solid block entry sizes out of range".into()))
    }

    /// Returns the absolute file offset and byte count of each packed stream
    /// belonging to `folder_idx`.
    fn folder_pack_streams(&self, folder_idx: usize) -> Result<Vec<(u64, u64)>> {
        let pack_info = self
            .header
            .pack_info
            .as_ref()
            .ok_or_else(|| Error::Malformed("missing pack info".into()))?;
        let unpack_info = self
            .header
            .unpack_info
            .as_ref()
            .ok_or_else(|| Error::Malformed("missing unpack info".into()))?;
        let folder = unpack_info
            .folders
            .get(folder_idx)
            .ok_or_else(|| Error::Malformed(format!("folder index {} out of range", folder_idx)))?;

        let start_stream: usize = unpack_info.folders[..folder_idx]
            .iter()
            .map(|f| f.packed_streams.len())
            .sum();
        let num_streams = folder.packed_streams.len();

        let data_start = SIGNATURE_HEADER_SIZE + pack_info.pack_pos;
        let mut offset = data_start
            + pack_info.pack_sizes[..start_stream]
                .iter()
                .sum::<u64>();

        let mut ranges = Vec::with_capacity(num_streams);
        for &size in &pack_info.pack_sizes[start_stream..start_stream + num_streams] {
            ranges.push((offset, size));
            offset += size;
        }
        Ok(ranges)
    }

    /// Reads the raw (still compressed) bytes for every packed stream of a folder.
    fn read_folder_pack_streams(&mut self, folder_idx: usize) -> Result<Vec<Vec<u8>>> {
        let ranges = self.folder_pack_streams(folder_idx)?;
        let mut streams = Vec::with_capacity(ranges.len());
        for (offset, size) in ranges {
            self.reader.seek(SeekFrom::Start(offset)).map_err(Error::Io)?;
            let mut buf = vec![0u8; size as usize];
            self.reader.read_exact(&mut buf).map_err(Error::Io)?;
            streams.push(buf);
        }
        Ok(streams)
    }

    /// Extracts a single-stream (non-BCJ2) or BCJ2 entry, writing uncompressed
    /// bytes to `output`.
    pub(crate) fn extract_single_stream(
        &mut self,
        folder: &Folder,
        folder_idx: usize,
        stream_index: Option<usize>,
        expected_size: u64,
        output: &mut impl Write,
        limits: &ExtractionLimits,
    ) -> Result<u64> {
        if folder.uses_bcj2() {
            return self.extract_bcj2(folder, folder_idx, stream_index, output, limits);
        }

        let mut pack_streams = self.read_folder_pack_streams(folder_idx)?;
        let packed_data = pack_streams
            .pop()
            .ok_or_else(|| Error::Malformed("folder has no packed streams".into()))?;

        if self.is_solid_block(folder_idx) {
            self.extract_from_solid_block(
                packed_data,
                folder,
                folder_idx,
                stream_index.unwrap_or(0),
                output,
                limits,
            )
        } else {
            self.extract_non_solid(packed_data, folder, expected_size, output, limits)
        }
    }

    /// Decodes a BCJ2 folder's four input streams and writes the decoded
    /// output, handling solid blocks the same way as the simpler coders.
    fn extract_bcj2(
        &mut self,
        folder: &Folder,
        folder_idx: usize,
        stream_index: Option<usize>,
        output: &mut impl Write,
        limits: &ExtractionLimits,
    ) -> Result<u64> {
        let pack_streams = self.read_folder_pack_streams(folder_idx)?;
        let mut decoder = codec::build_bcj2_folder_decoder(folder, &pack_streams)?;

        if self.is_solid_block(folder_idx) {
            let entry_sizes = self.get_solid_block_entry_sizes(folder_idx)?;
            let idx = stream_index.unwrap_or(0);
            let target_size = *entry_sizes
                .get(idx)
                .ok_or_else(|| Error::Malformed("stream index out of range for solid block".into()))?;

            skip_bytes(&mut decoder, entry_sizes.iter().take(idx).sum())?;

            let compressed_size: u64 = pack_streams.iter().map(|s| s.len() as u64).sum();
            let mut limited = limits.wrap_reader(decoder, compressed_size);
            copy_exact(&mut limited, output, target_size)
        } else {
            let compressed_size: u64 = pack_streams.iter().map(|s| s.len() as u64).sum();
            let total_size = folder.final_unpack_size().unwrap_or(0);
            let mut limited = limits.wrap_reader(decoder, compressed_size);
            copy_exact(&mut limited, output, total_size)
        }
    }

    /// Decompresses a non-solid folder (exactly one entry) directly to `output`.
    pub(crate) fn extract_non_solid(
        &self,
        packed_data: Vec<u8>,
        folder: &Folder,
        expected_size: u64,
        output: &mut impl Write,
        limits: &ExtractionLimits,
    ) -> Result<u64> {
        if folder.coders.is_empty() {
            return Err(Error::Malformed("folder has no coders".into()));
        }

        let uncompressed_size = folder.final_unpack_size().unwrap_or(expected_size);
        let compressed_size = packed_data.len() as u64;

        let cursor = Cursor::new(packed_data);
        let decoder = self.build_decoder_chain(cursor, folder, uncompressed_size)?;
        let mut limited = limits.wrap_reader(decoder, compressed_size);

        copy_exact(&mut limited, output, uncompressed_size)
    }

    /// Decompresses a solid-block folder, skipping preceding entries and
    /// copying only the target entry's bytes to `output`.
    pub(crate) fn extract_from_solid_block(
        &self,
        packed_data: Vec<u8>,
        folder: &Folder,
        folder_idx: usize,
        stream_index: usize,
        output: &mut impl Write,
        limits: &ExtractionLimits,
    ) -> Result<u64> {
        if folder.coders.is_empty() {
            return Err(Error::Malformed("folder has no coders".into()));
        }

        let entry_sizes = self.get_solid_block_entry_sizes(folder_idx)?;
        let target_size = *entry_sizes.get(stream_index).ok_or_else(|| {
            Error::Malformed(format!(
                "stream index {} out of range for solid block",
                stream_index
            ))
        })?;

        let uncompressed_size = folder.final_unpack_size().unwrap_or(0);
        let compressed_size = packed_data.len() as u64;

        let cursor = Cursor::new(packed_data);
        let mut decoder = self.build_decoder_chain(cursor, folder, uncompressed_size)?;

        let skip: u64 = entry_sizes.iter().take(stream_index).sum();
        skip_bytes(&mut decoder, skip)?;

        let mut limited = limits.wrap_reader(&mut decoder, compressed_size);
        copy_exact(&mut limited, output, target_size)
    }
}

/// Reads and discards exactly `count` bytes from `reader`.
fn skip_bytes(reader: &mut impl Read, count: u64) -> Result<()> {
    let mut remaining = count;
    let mut buf = [0u8; READ_BUFFER_SIZE];
    while remaining > 0 {
        let to_read = buf.len().min(remaining as usize);
        let n = reader.read(&mut buf[..to_read]).map_err(super::map_io_error)?;
        if n == 0 {
            break;
        }
        remaining -= n as u64;
    }
    Ok(())
}

/// Copies exactly `count` bytes from `reader` to `writer`, mapping limit
/// violations through [`super::map_io_error`].
fn copy_exact(reader: &mut impl Read, writer: &mut impl Write, count: u64) -> Result<u64> {
    let mut remaining = count;
    let mut total = 0u64;
    let mut buf = [0u8; READ_BUFFER_SIZE];
    while remaining > 0 {
        let to_read = buf.len().min(remaining as usize);
        let n = reader
            .read(&mut buf[..to_read])
            .map_err(super::map_io_error)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).map_err(Error::Io)?;
        total += n as u64;
        remaining -= n as u64;
    }
    Ok(total)
}
