use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use anyhow::{Result, bail};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Sizes and offsets at or above this value need ZIP64 fields.
pub const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// Entry counts at or above this value need the ZIP64 end record.
pub const ZIP64_ENTRY_THRESHOLD: u64 = 0xFFFF;

/// Header ID of the ZIP64 extended information extra field.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// General purpose flag: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// General purpose flag: written with maximum deflate compression.
pub const FLAG_MAX_COMPRESSION: u16 = 0x0002;

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("Invalid End of Central Directory");
        }

        // Verify signature
        if &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Serialize the fixed part of the record; the comment follows it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(Self::SIGNATURE);
        // Writes into a Vec cannot fail
        let _ = out.write_u16::<LittleEndian>(self.disk_number);
        let _ = out.write_u16::<LittleEndian>(self.disk_with_cd);
        let _ = out.write_u16::<LittleEndian>(self.disk_entries);
        let _ = out.write_u16::<LittleEndian>(self.total_entries);
        let _ = out.write_u32::<LittleEndian>(self.cd_size);
        let _ = out.write_u32::<LittleEndian>(self.cd_offset);
        let _ = out.write_u16::<LittleEndian>(self.comment_len);
        out
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("Invalid ZIP64 format");
        }

        if &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(Self::SIGNATURE);
        let _ = out.write_u32::<LittleEndian>(self.disk_with_eocd64);
        let _ = out.write_u64::<LittleEndian>(self.eocd64_offset);
        let _ = out.write_u32::<LittleEndian>(self.total_disks);
        out
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            bail!("Invalid ZIP64 format");
        }

        if &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::MIN_SIZE);
        out.extend_from_slice(Self::SIGNATURE);
        let _ = out.write_u64::<LittleEndian>(self.eocd64_size);
        let _ = out.write_u16::<LittleEndian>(self.version_made_by);
        let _ = out.write_u16::<LittleEndian>(self.version_needed);
        let _ = out.write_u32::<LittleEndian>(self.disk_number);
        let _ = out.write_u32::<LittleEndian>(self.disk_with_cd);
        let _ = out.write_u64::<LittleEndian>(self.disk_entries);
        let _ = out.write_u64::<LittleEndian>(self.total_entries);
        let _ = out.write_u64::<LittleEndian>(self.cd_size);
        let _ = out.write_u64::<LittleEndian>(self.cd_offset);
        out
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Where the central directory lives and how many records it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectory {
    /// Absolute file offset of the first record
    pub offset: u64,
    /// Size of all records in bytes
    pub size: u64,
    pub total_entries: u64,
    /// Bytes found in front of the archive proper (self-extractor stubs etc.)
    pub prefix_len: u64,
    /// Offset of the EOCD record
    pub eocd_offset: u64,
    pub comment_len: u16,
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    /// Name exactly as stored in the central directory
    pub name: Vec<u8>,
    /// Lossy UTF-8 rendering of `name` for messages
    pub file_name: String,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub is_directory: bool,
}

impl ZipFileEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Whether rewriting this entry needs the large-file (ZIP64) variant
    pub fn needs_zip64(&self) -> bool {
        self.uncompressed_size >= ZIP64_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eocd_survives_serialization() {
        let eocd = EndOfCentralDirectory {
            disk_entries: 3,
            total_entries: 3,
            cd_size: 0x1234,
            cd_offset: 0x5678,
            comment_len: 22,
            ..Default::default()
        };
        let bytes = eocd.to_bytes();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        assert_eq!(EndOfCentralDirectory::from_bytes(&bytes).unwrap(), eocd);
        assert!(!eocd.is_zip64());
    }

    #[test]
    fn eocd_rejects_bad_signature() {
        let mut bytes = EndOfCentralDirectory::default().to_bytes();
        bytes[3] = 0x07;
        assert!(EndOfCentralDirectory::from_bytes(&bytes).is_err());
        assert!(EndOfCentralDirectory::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn saturated_fields_mark_zip64() {
        let eocd = EndOfCentralDirectory {
            total_entries: 0xFFFF,
            ..Default::default()
        };
        assert!(eocd.is_zip64());
    }

    #[test]
    fn zip64_records_have_expected_sizes() {
        let record = Zip64EOCD {
            eocd64_size: 44,
            version_made_by: 45,
            version_needed: 45,
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: 70_000,
            total_entries: 70_000,
            cd_size: 1 << 33,
            cd_offset: 1 << 34,
        };
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), Zip64EOCD::MIN_SIZE);
        assert_eq!(Zip64EOCD::from_bytes(&bytes).unwrap(), record);

        let locator = Zip64EOCDLocator {
            disk_with_eocd64: 0,
            eocd64_offset: 1 << 35,
            total_disks: 1,
        };
        assert_eq!(locator.to_bytes().len(), Zip64EOCDLocator::SIZE);
    }
}
