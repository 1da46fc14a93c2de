//! Decoder chain construction shared by the extraction paths.

use std::io::Read;

use crate::format::streams::Folder;
use crate::{Error, Result, codec};

use super::entries;
use super::Archive;

impl<R: Read + std::io::Seek> Archive<R> {
    /// Builds a decoder chain for a folder, handling filter+codec combinations
    /// and encrypted folders.
    ///
    /// For single-coder folders, returns a simple decoder. For two-coder
    /// folders (filter + codec), chains them in the correct data-flow order.
    /// Encrypted folders are decrypted with the archive's stored password
    /// before any further decoding. BCJ2 folders (four inputs) are not
    /// handled here; extraction dispatches those separately.
    pub(crate) fn build_decoder_chain<T: Read + Send + 'static>(
        &self,
        input: T,
        folder: &Folder,
        uncompressed_size: u64,
    ) -> Result<Box<dyn Read + Send>> {
        if entries::folder_uses_encryption(folder) {
            let password = self.password.as_ref().ok_or(Error::PasswordRequired)?;
            let decoder =
                codec::build_encrypted_folder_decoder(input, folder, uncompressed_size, password)?;
            return Ok(Box::new(decoder));
        }

        codec::build_decoder_chain(input, folder, uncompressed_size)
    }
}
