//! # sevenvault
//!
//! A pure-Rust library for reading 7z archives, including AES-256 encrypted
//! and solid archives.
//!
//! ## Quick Start
//!
//! ### Reading an Archive
//!
//! ```rust,no_run
//! use sevenvault::{Archive, Result};
//!
//! fn main() -> Result<()> {
//!     // Open from a file path
//!     let mut archive = Archive::open_path("archive.7z")?;
//!
//!     // List entries
//!     for entry in archive.entries() {
//!         println!("{}: {} bytes", entry.path.as_str(), entry.size);
//!     }
//!
//!     // Extract a single entry into memory
//!     let data = archive.extract_to_vec("file.txt")?;
//!     println!("read {} bytes", data.len());
//!     Ok(())
//! }
//! ```
//!
//! ### Extracting Password-Protected Archives
//!
//! ```rust,no_run
//! use sevenvault::{Archive, Password, Result};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open_path_with_password(
//!         "encrypted.7z",
//!         Password::new("secret"),
//!     )?;
//!     let data = archive.extract_to_vec("secret.txt")?;
//!     println!("read {} bytes", data.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], which is an alias for
//! `std::result::Result<T, Error>`. The [`Error`] enum covers all possible
//! failure modes:
//!
//! ```rust,no_run
//! use sevenvault::{Archive, Error};
//!
//! fn open_archive(path: &str) -> sevenvault::Result<()> {
//!     match Archive::open_path(path) {
//!         Ok(archive) => {
//!             println!("Opened archive with {} entries", archive.len());
//!             Ok(())
//!         }
//!         Err(Error::Io(e)) => {
//!             eprintln!("I/O error: {}", e);
//!             Err(Error::Io(e))
//!         }
//!         Err(Error::Malformed(msg)) => {
//!             eprintln!("Not a valid 7z file: {}", msg);
//!             Err(Error::Malformed(msg))
//!         }
//!         Err(e @ Error::BadPassword { .. }) => {
//!             eprintln!("Incorrect password");
//!             Err(e)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! # fn main() {}
//! ```
//!
//! ## Safety and Resource Limits
//!
//! The library includes built-in protections against malicious archives:
//!
//! - **Resource limits**: Guards against decompression bombs (entry size,
//!   total size, and compression-ratio ceilings), configurable via
//!   [`ResourceLimits`].
//! - **CRC verification**: Validates data integrity after decompression.
//!
//! ```rust,no_run
//! use sevenvault::{Archive, ResourceLimits};
//!
//! let limits = ResourceLimits::default().max_entry_unpacked(256 * 1024 * 1024);
//! let archive = Archive::open_path_with_limits("archive.7z", limits);
//! ```
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for read operations (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod archive_path;
pub mod checksum;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod format;
pub mod read;
pub mod safety;
pub mod timestamp;

pub use archive_path::ArchivePath;
pub use crypto::Password;
pub use error::{Error, Result};
pub use timestamp::Timestamp;

// Re-export reading API at crate root for convenience
pub use read::{Archive, ArchiveInfo, EncryptionInfo, Entry, TestResult};

// Re-export safety utilities
pub use format::streams::{LimitMode, RatioLimit, ResourceLimits};
pub use safety::LimitedReader;
