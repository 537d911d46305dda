//! Deterministic ZIP writer.
//!
//! Every member is written with the same fixed metadata so that identical
//! content always produces identical bytes:
//!
//! - DEFLATE at maximum compression, general purpose flag bit 1 set
//! - DOS timestamp 1996-12-24 23:32:00
//! - version made by 0, version needed 20 (45 with ZIP64 fields)
//! - no attributes, comments or extra fields apart from ZIP64 ones
//!
//! Local headers are written with a zero CRC and sizes, then patched once
//! the member's data is complete, so no data descriptors are emitted. The
//! central directory is kept in memory until [`ZipWriter::finish`] so the
//! caller can checksum it before the archive comment is chosen.

use std::io::{SeekFrom, Write};

use anyhow::{Result, bail};
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
// AsyncWriteExt is not imported: its big-endian helpers would clash with
// byteorder's on Vec<u8>.
use tokio::io::{AsyncSeek, AsyncSeekExt, AsyncWrite};

use super::structures::*;

/// 23:32:00
pub const DOS_TIME: u16 = (23 << 11) | (32 << 5);
/// 1996-12-24
pub const DOS_DATE: u16 = ((1996 - 1980) << 9) | (12 << 5) | 24;

const VERSION_MADE_BY: u16 = 0;
const VERSION_DEFAULT: u16 = 20;
const VERSION_ZIP64: u16 = 45;

/// Size of a ZIP64 extra field carrying both sizes, header included.
const LOCAL_ZIP64_EXTRA_LEN: u16 = 20;

/// Writes a fresh archive member by member.
pub struct ZipWriter<W> {
    inner: W,
    /// Bytes written so far, i.e. the offset of the next record
    position: u64,
    central_directory: Vec<u8>,
    entries: u64,
}

impl<W: AsyncWrite + AsyncSeek + Unpin> ZipWriter<W> {
    /// Start writing at the current position of `inner`, which must be 0.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            position: 0,
            central_directory: Vec::new(),
            entries: 0,
        }
    }

    /// Number of members completed so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Central directory records of every completed member, as they will
    /// appear on disk.
    pub fn central_directory(&self) -> &[u8] {
        &self.central_directory
    }

    /// Begin a new member called `name`.
    ///
    /// `large` selects the ZIP64 local header layout and must be set for
    /// members of 4 GiB or more.
    pub async fn start_entry(&mut self, name: &[u8], large: bool) -> Result<EntryWriter<'_, W>> {
        let name_len = u16::try_from(name.len())?;
        let header_offset = self.position;

        let mut header = Vec::with_capacity(LFH_SIZE + name.len() + 20);
        header.extend_from_slice(LFH_SIGNATURE);
        header.write_u16::<LittleEndian>(if large { VERSION_ZIP64 } else { VERSION_DEFAULT })?;
        header.write_u16::<LittleEndian>(FLAG_MAX_COMPRESSION)?;
        header.write_u16::<LittleEndian>(CompressionMethod::Deflate.as_u16())?;
        header.write_u16::<LittleEndian>(DOS_TIME)?;
        header.write_u16::<LittleEndian>(DOS_DATE)?;
        header.write_u32::<LittleEndian>(0)?; // crc, patched later
        let placeholder = if large { ZIP64_THRESHOLD as u32 } else { 0 };
        header.write_u32::<LittleEndian>(placeholder)?;
        header.write_u32::<LittleEndian>(placeholder)?;
        header.write_u16::<LittleEndian>(name_len)?;
        header.write_u16::<LittleEndian>(if large { LOCAL_ZIP64_EXTRA_LEN } else { 0 })?;
        header.extend_from_slice(name);
        if large {
            header.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
            header.write_u16::<LittleEndian>(16)?;
            header.write_u64::<LittleEndian>(0)?;
            header.write_u64::<LittleEndian>(0)?;
        }

        self.write_all(&header).await?;

        Ok(EntryWriter {
            writer: self,
            name: name.to_vec(),
            large,
            header_offset,
            encoder: DeflateEncoder::new(Vec::new(), Compression::best()),
            hasher: crc32fast::Hasher::new(),
            uncompressed: 0,
            compressed: 0,
        })
    }

    /// Write the central directory and end records with `comment`, flush,
    /// and hand back the underlying writer.
    pub async fn finish(mut self, comment: &[u8]) -> Result<W> {
        let comment_len = u16::try_from(comment.len())?;
        let cd_offset = self.position;
        let cd_size = self.central_directory.len() as u64;

        let directory = std::mem::take(&mut self.central_directory);
        self.write_all(&directory).await?;

        let zip64 = self.entries >= ZIP64_ENTRY_THRESHOLD || cd_offset >= ZIP64_THRESHOLD;
        if zip64 {
            let record_offset = self.position;
            let record = Zip64EOCD {
                eocd64_size: (Zip64EOCD::MIN_SIZE - 12) as u64,
                version_made_by: VERSION_ZIP64,
                version_needed: VERSION_ZIP64,
                disk_number: 0,
                disk_with_cd: 0,
                disk_entries: self.entries,
                total_entries: self.entries,
                cd_size,
                cd_offset,
            };
            self.write_all(&record.to_bytes()).await?;

            let locator = Zip64EOCDLocator {
                disk_with_eocd64: 0,
                eocd64_offset: record_offset,
                total_disks: 1,
            };
            self.write_all(&locator.to_bytes()).await?;
        }

        let entries = self.entries.min(ZIP64_ENTRY_THRESHOLD) as u16;
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size: cd_size.min(ZIP64_THRESHOLD) as u32,
            cd_offset: cd_offset.min(ZIP64_THRESHOLD) as u32,
            comment_len,
        };
        self.write_all(&eocd.to_bytes()).await?;
        self.write_all(comment).await?;
        tokio::io::AsyncWriteExt::flush(&mut self.inner).await?;

        Ok(self.inner)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        tokio::io::AsyncWriteExt::write_all(&mut self.inner, data).await?;
        self.position += data.len() as u64;
        Ok(())
    }
}

/// A member being written; call [`EntryWriter::finish`] to complete it.
pub struct EntryWriter<'a, W> {
    writer: &'a mut ZipWriter<W>,
    name: Vec<u8>,
    large: bool,
    header_offset: u64,
    encoder: DeflateEncoder<Vec<u8>>,
    hasher: crc32fast::Hasher,
    uncompressed: u64,
    compressed: u64,
}

impl<W: AsyncWrite + AsyncSeek + Unpin> EntryWriter<'_, W> {
    /// Compress and append `data` to the member.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.hasher.update(data);
        self.uncompressed += data.len() as u64;
        self.encoder.write_all(data)?;
        self.drain().await
    }

    /// Flush the compressor, patch the local header and record the member
    /// in the central directory.
    pub async fn finish(mut self) -> Result<()> {
        self.encoder.try_finish()?;
        self.drain().await?;

        let crc = self.hasher.clone().finalize();
        if !self.large && (self.uncompressed >= ZIP64_THRESHOLD || self.compressed >= ZIP64_THRESHOLD) {
            bail!(
                "\"{}\" grew past 4 GiB without ZIP64 fields",
                String::from_utf8_lossy(&self.name)
            );
        }

        let mut patch = Vec::with_capacity(12);
        patch.write_u32::<LittleEndian>(crc)?;
        if !self.large {
            patch.write_u32::<LittleEndian>(self.compressed as u32)?;
            patch.write_u32::<LittleEndian>(self.uncompressed as u32)?;
        }
        self.patch_at(self.header_offset + 14, &patch).await?;

        if self.large {
            let mut sizes = Vec::with_capacity(16);
            sizes.write_u64::<LittleEndian>(self.uncompressed)?;
            sizes.write_u64::<LittleEndian>(self.compressed)?;
            let extra_values = self.header_offset + LFH_SIZE as u64 + self.name.len() as u64 + 4;
            self.patch_at(extra_values, &sizes).await?;
        }

        self.write_central_record(crc)?;
        self.writer.entries += 1;
        Ok(())
    }

    fn write_central_record(&mut self, crc: u32) -> Result<()> {
        let big_uncompressed = self.uncompressed >= ZIP64_THRESHOLD;
        let big_compressed = self.compressed >= ZIP64_THRESHOLD;
        let big_offset = self.header_offset >= ZIP64_THRESHOLD;

        let mut extra = Vec::new();
        if big_uncompressed {
            extra.write_u64::<LittleEndian>(self.uncompressed)?;
        }
        if big_compressed {
            extra.write_u64::<LittleEndian>(self.compressed)?;
        }
        if big_offset {
            extra.write_u64::<LittleEndian>(self.header_offset)?;
        }
        let extra_len = if extra.is_empty() { 0 } else { extra.len() as u16 + 4 };
        let version = if self.large || !extra.is_empty() {
            VERSION_ZIP64
        } else {
            VERSION_DEFAULT
        };

        let cd = &mut self.writer.central_directory;
        cd.extend_from_slice(CDFH_SIGNATURE);
        cd.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
        cd.write_u16::<LittleEndian>(version)?;
        cd.write_u16::<LittleEndian>(FLAG_MAX_COMPRESSION)?;
        cd.write_u16::<LittleEndian>(CompressionMethod::Deflate.as_u16())?;
        cd.write_u16::<LittleEndian>(DOS_TIME)?;
        cd.write_u16::<LittleEndian>(DOS_DATE)?;
        cd.write_u32::<LittleEndian>(crc)?;
        cd.write_u32::<LittleEndian>(self.compressed.min(ZIP64_THRESHOLD) as u32)?;
        cd.write_u32::<LittleEndian>(self.uncompressed.min(ZIP64_THRESHOLD) as u32)?;
        cd.write_u16::<LittleEndian>(self.name.len() as u16)?;
        cd.write_u16::<LittleEndian>(extra_len)?;
        cd.write_u16::<LittleEndian>(0)?; // comment length
        cd.write_u16::<LittleEndian>(0)?; // disk number start
        cd.write_u16::<LittleEndian>(0)?; // internal attributes
        cd.write_u32::<LittleEndian>(0)?; // external attributes
        cd.write_u32::<LittleEndian>(self.header_offset.min(ZIP64_THRESHOLD) as u32)?;
        cd.extend_from_slice(&self.name);
        if !extra.is_empty() {
            cd.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
            cd.write_u16::<LittleEndian>(extra.len() as u16)?;
            cd.extend_from_slice(&extra);
        }
        Ok(())
    }

    /// Move whatever the compressor produced into the archive.
    async fn drain(&mut self) -> Result<()> {
        let pending = std::mem::take(self.encoder.get_mut());
        if !pending.is_empty() {
            self.compressed += pending.len() as u64;
            self.writer.write_all(&pending).await?;
        }
        Ok(())
    }

    async fn patch_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let inner = &mut self.writer.inner;
        inner.seek(SeekFrom::Start(offset)).await?;
        tokio::io::AsyncWriteExt::write_all(&mut *inner, bytes).await?;
        inner.seek(SeekFrom::Start(self.writer.position)).await?;
        Ok(())
    }
}
