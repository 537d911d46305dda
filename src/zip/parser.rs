//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For copying, read each file's Local File Header and data
//!
//! The central directory is taken to be the `cd_size` bytes directly in
//! front of the end record. Any gap between that position and the offset
//! stored in the end record is data prepended to the archive, and every
//! local header offset is shifted by it.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::entry::EntryReader;
use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser.
///
/// This struct handles reading and parsing ZIP structures from
/// a data source. It's generic over the reader type so the same code
/// serves local files and in-memory archives.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// let directory = parser.central_directory().await?;
/// for entry in parser.list_files(&directory).await? {
///     let mut data = parser.open_entry(&entry).await?;
///     // Stream decompressed bytes from `data`...
/// }
/// ```
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Total size of the archive in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Find the end record and its offset.
    ///
    /// Canonical archives always carry a 22 byte comment, so the fast path
    /// only helps foreign archives; everything else goes through the
    /// backwards scan over the largest possible comment.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        // No comment: the record is the last 22 bytes
        if self.size >= EndOfCentralDirectory::SIZE as u64 {
            let offset = self.size - EndOfCentralDirectory::SIZE as u64;
            let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
            self.reader.read_exact_at(offset, &mut buf).await?;

            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
                let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
                return Ok((eocd, offset));
            }
        }

        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        for i in (0..buf.len().saturating_sub(EndOfCentralDirectory::SIZE)).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment length field must account for every remaining byte.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the ZIP64 end record referenced by the locator in front of the
    /// regular end record at `eocd_offset`, returning it with its offset.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<(Zip64EOCD, u64)> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .context("Invalid ZIP64 format")?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        // The record sits in front of the locator; the stored offset does not
        // account for prepended data, so prefer the position we can derive.
        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        let derived = locator_offset.checked_sub(Zip64EOCD::MIN_SIZE as u64);
        if let Some(offset) = derived {
            self.reader.read_exact_at(offset, &mut eocd64_buf).await?;
            if let Ok(eocd64) = Zip64EOCD::from_bytes(&eocd64_buf) {
                return Ok((eocd64, offset));
            }
        }

        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        Ok((Zip64EOCD::from_bytes(&eocd64_buf)?, locator.eocd64_offset))
    }

    /// Locate the central directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the end records are missing or describe a
    /// directory that does not fit inside the file.
    pub async fn central_directory(&self) -> Result<CentralDirectory> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        if eocd.disk_number != 0 || eocd.disk_with_cd != 0 {
            bail!("Multi-disk archives are not supported");
        }

        // Get Central Directory info, using ZIP64 if needed
        let (cd_offset, cd_size, total_entries, record_offset) = if eocd.is_zip64() {
            let (eocd64, offset) = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries, offset)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
                eocd_offset,
            )
        };

        let start = record_offset
            .checked_sub(cd_size)
            .context("Central directory extends past the start of the file")?;
        let prefix_len = start
            .checked_sub(cd_offset)
            .context("Central directory offset points past the end record")?;

        if total_entries.saturating_mul(CDFH_MIN_SIZE as u64) > cd_size {
            bail!("Central directory too small for {} entries", total_entries);
        }

        Ok(CentralDirectory {
            offset: start,
            size: cd_size,
            total_entries,
            prefix_len,
            eocd_offset,
            comment_len: eocd.comment_len,
        })
    }

    /// List all files in the ZIP archive, in central directory order.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is invalid or cannot be read.
    pub async fn list_files(&self, directory: &CentralDirectory) -> Result<Vec<ZipFileEntry>> {
        let cd_len = usize::try_from(directory.size).context("Central directory too large")?;
        let mut cd_data = vec![0u8; cd_len];
        self.reader
            .read_exact_at(directory.offset, &mut cd_data)
            .await?;

        // Parse each Central Directory File Header entry
        let mut entries = Vec::with_capacity(directory.total_entries.min(u16::MAX as u64) as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..directory.total_entries {
            let mut entry = self.parse_cdfh(&mut cursor)?;
            entry.lfh_offset = entry
                .lfh_offset
                .checked_add(directory.prefix_len)
                .context("Local header offset overflow")?;
            entries.push(entry);
        }

        if cursor.position() != directory.size {
            bail!(
                "Central directory has {} trailing bytes",
                directory.size - cursor.position()
            );
        }

        Ok(entries)
    }

    /// Parse one central directory record, leaving `cursor` on the next.
    fn parse_cdfh(&self, cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            bail!("Invalid Central Directory File Header");
        }

        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let _last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        // Names are compared and rewritten byte for byte, so keep the raw form
        let mut name = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut name)?;
        let file_name = String::from_utf8_lossy(&name).to_string();

        // Directory entries end with '/'
        let is_directory = name.last() == Some(&b'/');

        let extra_field_end = cursor.position() + extra_field_length as u64;
        if extra_field_end > cursor.get_ref().len() as u64 {
            bail!("Extra field of \"{}\" runs past the central directory", file_name);
        }

        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()?;
            let field_end = (cursor.position() + field_size as u64).min(extra_field_end);

            if header_id == ZIP64_EXTRA_ID {
                // Only saturated fields are present, in this order
                if uncompressed_size == ZIP64_THRESHOLD && cursor.position() + 8 <= field_end {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == ZIP64_THRESHOLD && cursor.position() + 8 <= field_end {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == ZIP64_THRESHOLD && cursor.position() + 8 <= field_end {
                    lfh_offset = cursor.read_u64::<LittleEndian>()?;
                }
            }
            cursor.set_position(field_end);
        }

        cursor.set_position(extra_field_end + file_comment_length as u64);
        if cursor.position() > cursor.get_ref().len() as u64 {
            bail!("Comment of \"{}\" runs past the central directory", file_name);
        }

        Ok(ZipFileEntry {
            name,
            file_name,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            is_directory,
        })
    }

    /// Offset of the first data byte of `entry`.
    ///
    /// The local header's name and extra lengths can differ from the
    /// central record's, so they are read from the local header itself.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader
            .read_exact_at(entry.lfh_offset, &mut lfh_buf)
            .await
            .with_context(|| format!("Cannot read local header of \"{}\"", entry.file_name))?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header for \"{}\"", entry.file_name);
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;

        if data_offset.saturating_add(entry.compressed_size) > self.size {
            bail!("Data of \"{}\" runs past the end of the archive", entry.file_name);
        }

        Ok(data_offset)
    }

    /// Open an entry for streaming, verified decompression.
    ///
    /// # Errors
    ///
    /// Returns an error for encrypted entries, compression methods other
    /// than STORED and DEFLATE, and unreadable local headers.
    pub async fn open_entry(&self, entry: &ZipFileEntry) -> Result<EntryReader<'_, R>> {
        if entry.is_encrypted() {
            bail!("\"{}\" is encrypted", entry.file_name);
        }
        if let CompressionMethod::Unknown(method) = entry.compression_method {
            bail!(
                "Unsupported compression method {} for \"{}\"",
                method,
                entry.file_name
            );
        }

        let data_offset = self.get_data_offset(entry).await?;
        Ok(EntryReader::new(self.reader.as_ref(), entry, data_offset))
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}
