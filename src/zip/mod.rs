//! ZIP container codec.
//!
//! This module reads existing archives and writes new ones, supporting both
//! the standard ZIP format and the ZIP64 extensions for large archives.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`entry`]: Streaming, CRC-checked decompression of one member
//! - [`writer`]: Deterministic archive writer used for rebuilt archives
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end, followed by the
//!    archive comment
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB and archives with 65535+ entries
//! - STORED (no compression) and DEFLATE when reading, DEFLATE when writing
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod entry;
mod parser;
mod structures;
mod writer;

pub use entry::{EntryError, EntryReader};
pub use parser::ZipParser;
pub use structures::*;
pub use writer::{DOS_DATE, DOS_TIME, EntryWriter, ZipWriter};
