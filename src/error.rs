//! Error types for 7z archive operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when reading and decrypting 7z archives, along with a
//! convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. You can
//! handle errors using pattern matching or the `?` operator:
//!
//! ```rust,no_run
//! use sevenvault::{Archive, Result};
//!
//! fn read_archive(path: &str) -> Result<()> {
//!     let archive = Archive::open_path(path)?;
//!     println!("{} entries", archive.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Exhaustive Error Matching
//!
//! ```rust,no_run
//! use sevenvault::{Archive, Error};
//!
//! fn open_with_recovery(path: &str) -> sevenvault::Result<Archive<std::io::BufReader<std::fs::File>>> {
//!     match Archive::open_path(path) {
//!         Ok(archive) => Ok(archive),
//!         Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
//!             eprintln!("Archive not found: {}", path);
//!             Err(Error::Io(e))
//!         }
//!         Err(Error::Malformed(msg)) => {
//!             eprintln!("Not a valid 7z archive: {}", msg);
//!             Err(Error::Malformed(msg))
//!         }
//!         Err(e @ Error::BadPassword { .. }) => {
//!             eprintln!("Wrong password for this archive.");
//!             Err(e)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```

use std::io;

/// Helper struct for formatting [`Error::BadPassword`] messages.
struct BadPasswordDisplay<'a> {
    entry_index: Option<usize>,
    entry_name: Option<&'a str>,
}

impl std::fmt::Display for BadPasswordDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "wrong password")?;
        match (self.entry_index, self.entry_name) {
            (Some(idx), Some(name)) => write!(f, " for entry {} ({})", idx, name),
            (Some(idx), None) => write!(f, " for entry {}", idx),
            (None, Some(name)) => write!(f, " for entry '{}'", name),
            (None, None) => Ok(()),
        }
    }
}

/// Helper struct for formatting [`Error::IntegrityFailure`] messages.
struct IntegrityFailureDisplay<'a> {
    entry_index: usize,
    entry_name: Option<&'a str>,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for IntegrityFailureDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRC mismatch for entry {}", self.entry_index)?;
        if let Some(name) = self.entry_name {
            write!(f, " ({})", name)?;
        }
        write!(f, ": expected {:#x}, got {:#x}", self.expected, self.actual)
    }
}

/// The main error type for 7z archive operations.
///
/// This enum represents all possible errors that can occur when opening,
/// parsing, or extracting 7z archives. Each variant includes enough context
/// to diagnose the issue without needing to re-parse the archive.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | File system operations |
/// | Format | [`Malformed`][Self::Malformed], [`Truncated`][Self::Truncated], [`BadLength`][Self::BadLength] | Invalid or damaged archive data |
/// | Compatibility | [`UnsupportedVersion`][Self::UnsupportedVersion], [`Unsupported`][Self::Unsupported] | Archive features this build can't read |
/// | Encryption | [`BadPassword`][Self::BadPassword], [`PasswordRequired`][Self::PasswordRequired] | Password handling |
/// | Integrity | [`IntegrityFailure`][Self::IntegrityFailure] | CRC mismatch after decompression |
/// | Resources | [`ResourceLimitExceeded`][Self::ResourceLimitExceeded] | Safety limits |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading the archive.
    ///
    /// Check the underlying [`std::io::ErrorKind`] for specific handling.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive data does not follow the 7z format.
    ///
    /// This covers an invalid signature, a bad property tag sequence, a CRC
    /// mismatch on a header, or any structural inconsistency detected while
    /// parsing headers or stream metadata.
    #[error("malformed 7z archive: {0}")]
    Malformed(String),

    /// The archive's format version is newer than this build understands.
    ///
    /// Only major version 0 is supported; a different major version means
    /// the on-disk structures may have changed incompatibly.
    #[error("unsupported format version {major}.{minor}")]
    UnsupportedVersion {
        /// The major version found in the archive.
        major: u8,
        /// The minor version found in the archive.
        minor: u8,
    },

    /// The archive uses a compression method, filter, or coder topology
    /// that this build does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The archive or a stream within it ended before the expected amount
    /// of data was read.
    #[error("truncated data: expected {expected} bytes, found {found}")]
    Truncated {
        /// The number of bytes that were expected.
        expected: u64,
        /// The number of bytes actually available.
        found: u64,
    },

    /// A length or size field in the archive is invalid or inconsistent
    /// with the data it describes (for example, a negative-after-underflow
    /// pack size, or a folder whose sizes don't add up).
    #[error("invalid length: {0}")]
    BadLength(String),

    /// A decrypted/decompressed entry's CRC-32 does not match the value
    /// recorded in the archive.
    ///
    /// This usually indicates data corruption, but can also indicate a wrong
    /// password if early detection didn't already catch it.
    #[error("{}", IntegrityFailureDisplay { entry_index: *entry_index, entry_name: entry_name.as_deref(), expected: *expected, actual: *actual })]
    IntegrityFailure {
        /// The entry index with the CRC mismatch.
        entry_index: usize,
        /// The entry name/path with the CRC mismatch, if known.
        entry_name: Option<String>,
        /// The expected CRC value from the archive.
        expected: u32,
        /// The actual CRC value of the decrypted/decompressed data.
        actual: u32,
    },

    /// The supplied password is incorrect, or encrypted data is corrupted.
    ///
    /// **Note:** if no password was supplied at all,
    /// [`Error::PasswordRequired`] is returned instead.
    #[error("{}", BadPasswordDisplay { entry_index: *entry_index, entry_name: entry_name.as_deref() })]
    BadPassword {
        /// The entry index where the wrong password was detected, if known.
        entry_index: Option<usize>,
        /// The entry name where the wrong password was detected, if known.
        entry_name: Option<String>,
    },

    /// A password is required to read this archive, but none was provided.
    #[error("password required for encrypted archive")]
    PasswordRequired,

    /// A resource limit configured via [`ResourceLimits`] was exceeded.
    ///
    /// This protects against maliciously crafted archives (decompression
    /// bombs, header size bombs, entry count bombs).
    ///
    /// [`ResourceLimits`]: crate::format::streams::ResourceLimits
    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),
}

impl Error {
    /// Returns `true` if this error might be recoverable by the caller
    /// (retrying with a different password, or a transient I/O retry).
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::BadPassword { .. } | Error::PasswordRequired => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns `true` if this is a data corruption error (malformed headers
    /// or a CRC mismatch).
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Malformed(_) | Error::IntegrityFailure { .. })
    }

    /// Returns `true` if this is an encryption-related error.
    pub fn is_encryption_error(&self) -> bool {
        matches!(self, Error::BadPassword { .. } | Error::PasswordRequired)
    }

    /// Returns `true` if this error is related to an unsupported archive
    /// feature or format version.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::Unsupported(_) | Error::UnsupportedVersion { .. }
        )
    }

    /// Returns the entry index associated with this error, if any.
    pub fn entry_index(&self) -> Option<usize> {
        match self {
            Error::BadPassword { entry_index, .. } => *entry_index,
            Error::IntegrityFailure { entry_index, .. } => Some(*entry_index),
            _ => None,
        }
    }

    /// Returns the entry name/path associated with this error, if any.
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Error::BadPassword { entry_name, .. } => entry_name.as_deref(),
            Error::IntegrityFailure { entry_name, .. } => entry_name.as_deref(),
            _ => None,
        }
    }

    /// Creates a [`Error::BadPassword`] with full context.
    pub fn bad_password(entry_index: Option<usize>, entry_name: Option<String>) -> Self {
        Error::BadPassword {
            entry_index,
            entry_name,
        }
    }

    /// Creates an [`Error::IntegrityFailure`].
    pub fn integrity_failure(
        entry_index: usize,
        entry_name: Option<String>,
        expected: u32,
        actual: u32,
    ) -> Self {
        Error::IntegrityFailure {
            entry_index,
            entry_name,
            expected,
            actual,
        }
    }

    /// Creates a [`Error::Malformed`] describing corruption at a byte offset.
    pub fn corrupt_at(offset: u64, reason: impl std::fmt::Display) -> Self {
        Error::Malformed(format!("at offset {:#x}: {}", offset, reason))
    }
}

/// A specialized [`Result`] type for 7z operations.
pub type Result<T> = std::result::Result<T, Error>;
