//! Compression codec infrastructure for 7z archives.
//!
//! This module provides the abstraction layer for compression codecs and
//! integrates LZMA/LZMA2, Deflate, BZip2, the BCJ/BCJ2/Delta filters, and
//! AES-256 decryption.

pub mod lzma;

pub mod deflate;

pub mod bzip2;

pub mod filters;

pub mod bcj2;

mod copy;

use crate::{Error, Result};
use std::io::{self, Cursor, Read};

use crate::format::streams::{Coder, Folder};

/// A decoder that reads compressed data and produces uncompressed output.
pub trait Decoder: Read + Send {
    /// Returns the method ID for this decoder.
    fn method_id(&self) -> &'static [u8];
}

/// Copy decoder (no compression).
pub use copy::CopyDecoder;

pub use lzma::{Lzma2Decoder, LzmaDecoder};

pub use deflate::DeflateDecoder;

pub use bzip2::Bzip2Decoder;

pub use filters::{
    BcjArm64Decoder, BcjArmDecoder, BcjArmThumbDecoder, BcjIa64Decoder, BcjPpcDecoder,
    BcjRiscvDecoder, BcjSparcDecoder, BcjX86Decoder, DeltaDecoder,
};

pub use bcj2::{Bcj2Decoder, Bcj2DecoderWrapper};

/// Method IDs for compression algorithms.
pub mod method {
    /// Copy (no compression).
    pub const COPY: &[u8] = &[0x00];
    /// LZMA compression.
    pub const LZMA: &[u8] = &[0x03, 0x01, 0x01];
    /// LZMA2 compression.
    pub const LZMA2: &[u8] = &[0x21];
    /// Deflate compression.
    pub const DEFLATE: &[u8] = &[0x04, 0x01, 0x08];
    /// BZip2 compression.
    pub const BZIP2: &[u8] = &[0x04, 0x02, 0x02];
    /// BCJ (x86) filter.
    pub const BCJ_X86: &[u8] = &[0x03, 0x03, 0x01, 0x03];
    /// BCJ (ARM) filter.
    pub const BCJ_ARM: &[u8] = &[0x03, 0x03, 0x05, 0x01];
    /// BCJ (ARM64/AArch64) filter.
    pub const BCJ_ARM64: &[u8] = &[0x0A];
    /// BCJ (ARM Thumb) filter.
    pub const BCJ_ARM_THUMB: &[u8] = &[0x03, 0x03, 0x07, 0x01];
    /// BCJ (PowerPC) filter.
    pub const BCJ_PPC: &[u8] = &[0x03, 0x03, 0x02, 0x05];
    /// BCJ (IA64/Itanium) filter.
    pub const BCJ_IA64: &[u8] = &[0x03, 0x03, 0x04, 0x01];
    /// BCJ (SPARC) filter.
    pub const BCJ_SPARC: &[u8] = &[0x03, 0x03, 0x08, 0x05];
    /// BCJ (RISC-V) filter.
    pub const BCJ_RISCV: &[u8] = &[0x0B];
    /// BCJ2 (4-stream x86) filter.
    pub const BCJ2: &[u8] = &[0x03, 0x03, 0x01, 0x1B];
    /// Delta filter.
    pub const DELTA: &[u8] = &[0x03];
    /// AES-256 encryption.
    pub const AES: &[u8] = &[0x06, 0xF1, 0x07, 0x01];

    /// Returns true if the method ID represents a filter (BCJ, Delta) rather
    /// than a compression codec.
    ///
    /// Filters are applied after decompression to reverse transformations
    /// like executable code preprocessing. They don't compress data.
    pub fn is_filter(method_id: &[u8]) -> bool {
        matches!(
            method_id,
            BCJ_X86
                | BCJ_ARM
                | BCJ_ARM64
                | BCJ_ARM_THUMB
                | BCJ_PPC
                | BCJ_IA64
                | BCJ_SPARC
                | BCJ_RISCV
                | DELTA
        )
    }

    /// Returns a human-readable name for a method ID.
    pub fn name(id: &[u8]) -> &'static str {
        match id {
            COPY => "Copy",
            LZMA => "LZMA",
            LZMA2 => "LZMA2",
            DEFLATE => "Deflate",
            BZIP2 => "BZip2",
            BCJ_X86 => "BCJ (x86)",
            BCJ_ARM => "BCJ (ARM)",
            BCJ_ARM64 => "BCJ (ARM64)",
            BCJ_ARM_THUMB => "BCJ (ARM Thumb)",
            BCJ_PPC => "BCJ (PowerPC)",
            BCJ_IA64 => "BCJ (IA64)",
            BCJ_SPARC => "BCJ (SPARC)",
            BCJ_RISCV => "BCJ (RISC-V)",
            BCJ2 => "BCJ2",
            DELTA => "Delta",
            AES => "AES-256",
            _ => "Unknown",
        }
    }
}

/// Builds a decoder for a given coder specification.
///
/// # Errors
///
/// Returns [`Error::Unsupported`] if the compression method is not
/// implemented, and [`Error::PasswordRequired`] if the coder is AES and
/// [`build_decoder_encrypted`] should be used instead.
pub(crate) fn build_decoder<R: Read + Send + 'static>(
    input: R,
    coder: &Coder,
    uncompressed_size: u64,
) -> Result<Box<dyn Decoder>> {
    let method_id = &coder.method_id;
    let properties = coder.properties.as_deref().unwrap_or(&[]);

    match method_id.as_slice() {
        method::COPY => Ok(Box::new(CopyDecoder::new(input, uncompressed_size))),

        method::LZMA => {
            let decoder = lzma::LzmaDecoder::new(input, properties, uncompressed_size)?;
            Ok(Box::new(decoder))
        }

        method::LZMA2 => {
            let decoder = lzma::Lzma2Decoder::new(input, properties)?;
            Ok(Box::new(decoder))
        }

        method::DEFLATE => {
            let buf_reader = std::io::BufReader::new(input);
            let decoder = deflate::DeflateDecoder::new(buf_reader);
            Ok(Box::new(decoder))
        }

        method::BZIP2 => {
            let decoder = bzip2::Bzip2Decoder::new(input);
            Ok(Box::new(decoder))
        }

        method::BCJ_X86 => Ok(Box::new(filters::BcjX86Decoder::new(input))),
        method::BCJ_ARM => Ok(Box::new(filters::BcjArmDecoder::new(input))),
        method::BCJ_ARM64 => Ok(Box::new(filters::BcjArm64Decoder::new(input))),
        method::BCJ_ARM_THUMB => Ok(Box::new(filters::BcjArmThumbDecoder::new(input))),
        method::BCJ_PPC => Ok(Box::new(filters::BcjPpcDecoder::new(input))),
        method::BCJ_IA64 => Ok(Box::new(filters::BcjIa64Decoder::new(input))),
        method::BCJ_SPARC => Ok(Box::new(filters::BcjSparcDecoder::new(input))),
        method::BCJ_RISCV => Ok(Box::new(filters::BcjRiscvDecoder::new(input))),
        method::DELTA => Ok(Box::new(filters::DeltaDecoder::new(input, properties))),

        // AES requires a password - use build_decoder_encrypted instead.
        method::AES => Err(Error::PasswordRequired),

        _ => Err(Error::Unsupported(format!(
            "method {:#x}",
            coder.method_id_u64()
        ))),
    }
}

/// Builds a decoder chain for a folder, handling filter+codec combinations.
///
/// Supports a single coder, a two-coder filter+codec chain (e.g. BCJ + LZMA2),
/// and plain sequential two-coder chains. BCJ2 folders (4 inputs, 1 output)
/// are not handled here; use [`build_bcj2_folder_decoder`] for those.
///
/// # Data Flow
///
/// For filter + codec combinations:
/// - Coders in folder: `[filter, codec]`
/// - Data flow: `packed → codec → filter → output`
pub(crate) fn build_decoder_chain<R: Read + Send + 'static>(
    input: R,
    folder: &Folder,
    uncompressed_size: u64,
) -> Result<Box<dyn Read + Send>> {
    match folder.coders.len() {
        0 => Err(Error::Malformed("folder has no coders".into())),

        1 => {
            let coder = &folder.coders[0];
            let decoder = build_decoder(input, coder, uncompressed_size)?;
            Ok(Box::new(decoder))
        }

        2 => {
            // In 7z, the coder order in the list is [filter, codec], but data
            // flows packed -> codec -> filter -> output. The bind_pair
            // connects them: the filter's input comes from the codec's output.
            let filter_coder = &folder.coders[0];
            let codec_coder = &folder.coders[1];

            let is_filter = method::is_filter(&filter_coder.method_id);

            if is_filter {
                let codec_output_size = folder
                    .unpack_sizes
                    .get(1)
                    .copied()
                    .unwrap_or(uncompressed_size);
                let codec_decoder = build_decoder(input, codec_coder, codec_output_size)?;
                let filter_decoder = build_decoder(codec_decoder, filter_coder, uncompressed_size)?;
                Ok(Box::new(filter_decoder))
            } else {
                // Not a filter chain - try plain sequential decoding.
                let first_output_size = folder
                    .unpack_sizes
                    .first()
                    .copied()
                    .unwrap_or(uncompressed_size);
                let first_decoder = build_decoder(input, filter_coder, first_output_size)?;
                let second_decoder = build_decoder(first_decoder, codec_coder, uncompressed_size)?;
                Ok(Box::new(second_decoder))
            }
        }

        n => Err(Error::Unsupported(format!(
            "folder with {} coders (only BCJ2 folders support more than two)",
            n
        ))),
    }
}

/// Builds a decoder for an encrypted coder specification.
///
/// The password is used to derive the decryption key via the 7z AES-256 KDF.
///
/// # Errors
///
/// Returns an error if the properties are malformed; does not itself verify
/// the password is correct (see [`validate_encrypted_folder_password`]).
pub(crate) fn build_decoder_encrypted<R: Read + Send + 'static>(
    input: R,
    coder: &Coder,
    uncompressed_size: u64,
    password: &crate::crypto::Password,
) -> Result<Box<dyn Decoder>> {
    let method_id = &coder.method_id;
    let properties = coder.properties.as_deref().unwrap_or(&[]);

    if method_id.as_slice() == method::AES {
        let aes_decoder = crate::crypto::Aes256Decoder::new(input, properties, password)?;
        Ok(Box::new(AesDecoderWrapper { inner: aes_decoder }))
    } else {
        build_decoder(input, coder, uncompressed_size)
    }
}

/// Wrapper to make [`crate::crypto::Aes256Decoder`] implement [`Decoder`].
struct AesDecoderWrapper<R: Read + Send> {
    inner: crate::crypto::Aes256Decoder<R>,
}

impl<R: Read + Send> Read for AesDecoderWrapper<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for AesDecoderWrapper<R> {
    fn method_id(&self) -> &'static [u8] {
        method::AES
    }
}

/// Builds a decoder chain for an encrypted folder.
///
/// Handles folders where AES encryption is combined with compression,
/// decrypting first and then applying the compression decoder. Validates
/// the password early by checking whether the first decrypted block looks
/// like valid compression data, avoiding wasted decompression of garbage.
pub(crate) fn build_encrypted_folder_decoder<R: Read + Send + 'static>(
    input: R,
    folder: &Folder,
    uncompressed_size: u64,
    password: &crate::crypto::Password,
) -> Result<Box<dyn Decoder>> {
    if folder.coders.is_empty() {
        return Err(Error::Malformed("folder has no coders".into()));
    }

    let aes_coder_idx = folder
        .coders
        .iter()
        .position(|c| c.method_id.as_slice() == method::AES);

    match (folder.coders.len(), aes_coder_idx) {
        // Single AES coder - just decrypt.
        (1, Some(0)) => {
            let coder = &folder.coders[0];
            build_decoder_encrypted(input, coder, uncompressed_size, password)
        }

        // Two coders: AES (outer) + compression (inner).
        // Data flow: packed -> AES decrypt -> decompression -> output.
        (2, Some(0)) => {
            let aes_coder = &folder.coders[0];
            let compression_coder = &folder.coders[1];
            let properties = aes_coder.properties.as_deref().unwrap_or(&[]);

            let mut aes_decoder = crate::crypto::Aes256Decoder::new(input, properties, password)?;

            let compression_method = &compression_coder.method_id;
            if !aes_decoder.validate_first_block(compression_method)? {
                return Err(Error::bad_password(None, None));
            }

            let intermediate_size = folder
                .unpack_sizes
                .first()
                .copied()
                .unwrap_or(uncompressed_size);

            build_decoder(aes_decoder, compression_coder, intermediate_size)
        }

        // Two coders: compression (outer) + AES (inner) - less common order.
        (2, Some(1)) => {
            let compression_coder = &folder.coders[0];
            let aes_coder = &folder.coders[1];

            let intermediate_size = folder
                .unpack_sizes
                .first()
                .copied()
                .unwrap_or(uncompressed_size);
            let decompressed = build_decoder(input, compression_coder, intermediate_size)?;

            build_decoder_encrypted(decompressed, aes_coder, uncompressed_size, password)
        }

        // Three coders: AES (outer) + filter + compression.
        (3, Some(0)) => {
            let aes_coder = &folder.coders[0];
            let filter_coder = &folder.coders[1];
            let compression_coder = &folder.coders[2];
            let properties = aes_coder.properties.as_deref().unwrap_or(&[]);

            let mut aes_decoder = crate::crypto::Aes256Decoder::new(input, properties, password)?;

            let validation_method = &compression_coder.method_id;
            if !aes_decoder.validate_first_block(validation_method)? {
                return Err(Error::bad_password(None, None));
            }

            let compression_size = folder
                .unpack_sizes
                .get(1)
                .copied()
                .unwrap_or(uncompressed_size);
            let decompressed = build_decoder(aes_decoder, compression_coder, compression_size)?;

            let filter_size = folder
                .unpack_sizes
                .first()
                .copied()
                .unwrap_or(uncompressed_size);
            build_decoder(decompressed, filter_coder, filter_size)
        }

        (_, None) => Err(Error::Malformed(
            "build_encrypted_folder_decoder called on non-encrypted folder".into(),
        )),

        _ => Err(Error::Unsupported(
            "encrypted folder with unsupported coder arrangement".into(),
        )),
    }
}

/// Validates a password against an encrypted folder without full decompression.
///
/// Decrypts the first block and checks if it looks like valid compression
/// data. A return of `true` doesn't guarantee the password is correct, only
/// that the first block looks plausible - CRC verification after full
/// decompression is the definitive check.
pub fn validate_encrypted_folder_password(
    packed_data: &[u8],
    folder: &Folder,
    password: &crate::crypto::Password,
) -> Result<bool> {
    let aes_coder = folder
        .coders
        .iter()
        .find(|c| c.method_id.as_slice() == method::AES)
        .ok_or_else(|| Error::Malformed("folder has no AES coder".into()))?;

    let compression_coder = folder.coders.iter().find(|c| {
        matches!(
            c.method_id.as_slice(),
            method::LZMA | method::LZMA2 | method::DEFLATE | method::BZIP2
        )
    });

    let compression_method = compression_coder
        .map(|c| c.method_id.as_slice())
        .unwrap_or(&[]);
    let properties = aes_coder.properties.as_deref().unwrap_or(&[]);

    let cursor = std::io::Cursor::new(packed_data);
    let mut aes_decoder = crate::crypto::Aes256Decoder::new(cursor, properties, password)?;

    Ok(aes_decoder.validate_first_block(compression_method)?)
}

/// Builds a decoder for a BCJ2 folder.
///
/// BCJ2 is a 4-stream filter that requires special handling:
/// - Stream 0 (Main): main code stream
/// - Stream 1 (Call): CALL destinations
/// - Stream 2 (Jump): JMP destinations
/// - Stream 3 (Range): range-coded selector bits
///
/// Each BCJ2 input typically comes from an LZMA/LZMA2 decoder fed by a
/// packed stream, though the Call/Jump/Range streams are often stored
/// uncompressed.
pub(crate) fn build_bcj2_folder_decoder(
    folder: &Folder,
    packed_data: &[Vec<u8>],
) -> Result<Box<dyn Decoder>> {
    let bcj2_coder_idx = folder
        .coders
        .iter()
        .position(|c| c.method_id.as_slice() == method::BCJ2)
        .ok_or_else(|| Error::Malformed("no BCJ2 coder in folder".into()))?;

    let bcj2_coder = &folder.coders[bcj2_coder_idx];

    if bcj2_coder.num_in_streams != 4 {
        return Err(Error::Malformed(format!(
            "BCJ2 expected 4 inputs, got {}",
            bcj2_coder.num_in_streams
        )));
    }

    let offsets = folder.coder_stream_offsets();
    let bcj2_first_in = offsets[bcj2_coder_idx].0 as u64;

    let mut bcj2_inputs: Vec<Vec<u8>> = Vec::with_capacity(4);
    for i in 0..4 {
        let in_stream_idx = bcj2_first_in + i;
        let input_data = resolve_input_stream(folder, &offsets, in_stream_idx, packed_data)?;
        bcj2_inputs.push(input_data);
    }

    let main = Cursor::new(bcj2_inputs.remove(0));
    let call = Cursor::new(bcj2_inputs.remove(0));
    let jump = Cursor::new(bcj2_inputs.remove(0));
    let range = Cursor::new(bcj2_inputs.remove(0));

    let decoder = bcj2::Bcj2Decoder::new(main, call, jump, range)?;

    Ok(Box::new(bcj2::Bcj2DecoderWrapper::new(decoder)))
}

/// Resolves an input stream to its decompressed data.
///
/// An input stream either comes from a packed stream (raw compressed data
/// from the archive) or from a bind_pair (output of another coder).
fn resolve_input_stream(
    folder: &Folder,
    offsets: &[(usize, usize)],
    in_stream_idx: u64,
    packed_data: &[Vec<u8>],
) -> Result<Vec<u8>> {
    if let Some(pack_idx) = folder.find_packed_stream_index(in_stream_idx) {
        if pack_idx >= packed_data.len() {
            return Err(Error::Malformed(format!(
                "pack index {} out of bounds (have {} streams)",
                pack_idx,
                packed_data.len()
            )));
        }

        let (coder_idx, _local_in_idx) = find_coder_for_input(folder, offsets, in_stream_idx)?;
        let coder = &folder.coders[coder_idx];

        // Inputs that belong to BCJ2 directly (not to a compression coder)
        // are returned raw; BCJ2's Call/Jump/Range streams are often stored
        // uncompressed in the archive.
        if coder.method_id.as_slice() == method::BCJ2 {
            return Ok(packed_data[pack_idx].clone());
        }

        let unpack_size = if coder_idx < folder.unpack_sizes.len() {
            folder.unpack_sizes[coder_idx]
        } else {
            u64::MAX
        };

        let input = Cursor::new(packed_data[pack_idx].clone());
        let mut decoder = build_decoder(input, coder, unpack_size)?;

        let mut output = Vec::new();
        decoder.read_to_end(&mut output).map_err(Error::Io)?;

        return Ok(output);
    }

    if let Some(bp) = folder.find_bind_pair_for_in_stream(in_stream_idx) {
        let (src_coder_idx, _local_out_idx) = find_coder_for_output(folder, offsets, bp.out_index)?;
        let src_coder = &folder.coders[src_coder_idx];
        let src_first_in = offsets[src_coder_idx].0 as u64;

        if src_coder.num_in_streams == 1 {
            let src_in_stream = src_first_in;
            return resolve_input_stream(folder, offsets, src_in_stream, packed_data);
        }

        return Err(Error::Unsupported("nested multi-input coders".into()));
    }

    Err(Error::Malformed(format!(
        "input stream {} not found in packed_streams or bind_pairs",
        in_stream_idx
    )))
}

/// Finds the coder index and local input index for a given global input stream index.
fn find_coder_for_input(
    folder: &Folder,
    offsets: &[(usize, usize)],
    in_stream_idx: u64,
) -> Result<(usize, usize)> {
    for (coder_idx, coder) in folder.coders.iter().enumerate() {
        let first_in = offsets[coder_idx].0 as u64;
        let last_in = first_in + coder.num_in_streams;
        if in_stream_idx >= first_in && in_stream_idx < last_in {
            return Ok((coder_idx, (in_stream_idx - first_in) as usize));
        }
    }
    Err(Error::Malformed(format!(
        "no coder found for input stream {}",
        in_stream_idx
    )))
}

/// Finds the coder index and local output index for a given global output stream index.
fn find_coder_for_output(
    folder: &Folder,
    offsets: &[(usize, usize)],
    out_stream_idx: u64,
) -> Result<(usize, usize)> {
    for (coder_idx, coder) in folder.coders.iter().enumerate() {
        let first_out = offsets[coder_idx].1 as u64;
        let last_out = first_out + coder.num_out_streams;
        if out_stream_idx >= first_out && out_stream_idx < last_out {
            return Ok((coder_idx, (out_stream_idx - first_out) as usize));
        }
    }
    Err(Error::Malformed(format!(
        "no coder found for output stream {}",
        out_stream_idx
    )))
}
