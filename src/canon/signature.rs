//! The archive comment marking an archive as canonical.
//!
//! The comment is `TORRENTZIPPED-` followed by the CRC-32 of the central
//! directory as eight upper-case hex digits. Because every structural
//! change to an archive (adding, removing, renaming or reordering members,
//! changing timestamps or sizes) alters the central directory, a matching
//! checksum proves the archive is unchanged since it was rebuilt, at the
//! cost of reading the directory only.

use anyhow::Result;

use crate::io::ReadAt;

/// Fixed text at the start of every signature comment.
pub const PREFIX: &[u8] = b"TORRENTZIPPED-";

/// Total length of a signature comment.
pub const COMMENT_LEN: usize = PREFIX.len() + 8;

/// Chunk size used when checksumming a directory stored on disk.
pub const CHUNK_SIZE: usize = 64 * 1024;

pub fn encode(checksum: u32) -> [u8; COMMENT_LEN] {
    let mut comment = [0u8; COMMENT_LEN];
    comment[..PREFIX.len()].copy_from_slice(PREFIX);
    comment[PREFIX.len()..].copy_from_slice(format!("{checksum:08X}").as_bytes());
    comment
}

/// Extract the checksum from a signature comment.
///
/// Anything but the exact prefix followed by exactly eight hex digits is
/// "no signature".
pub fn decode(comment: &[u8]) -> Option<u32> {
    if comment.len() != COMMENT_LEN || !comment.starts_with(PREFIX) {
        return None;
    }
    let digits = &comment[PREFIX.len()..];
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    // All ASCII, so the conversion cannot fail
    let digits = std::str::from_utf8(digits).ok()?;
    u32::from_str_radix(digits, 16).ok()
}

/// CRC-32 of central directory bytes held in memory.
pub fn checksum(directory: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for chunk in directory.chunks(CHUNK_SIZE) {
        hasher.update(chunk);
    }
    hasher.finalize()
}

/// CRC-32 of `len` bytes at `offset`, read in bounded chunks.
pub async fn checksum_at<R: ReadAt>(reader: &R, offset: u64, len: u64) -> Result<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE.min(usize::try_from(len).unwrap_or(CHUNK_SIZE))];
    let mut done = 0u64;

    while done < len {
        let want = (len - done).min(buf.len() as u64) as usize;
        reader.read_exact_at(offset + done, &mut buf[..want]).await?;
        hasher.update(&buf[..want]);
        done += want as u64;
    }

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use proptest::prelude::*;

    #[test]
    fn encodes_fixed_width_upper_case() {
        assert_eq!(&encode(0xAB), b"TORRENTZIPPED-000000AB");
        assert_eq!(&encode(0xDEADBEEF), b"TORRENTZIPPED-DEADBEEF");
        assert_eq!(encode(0).len(), 22);
    }

    #[test]
    fn decode_accepts_either_case() {
        assert_eq!(decode(b"TORRENTZIPPED-DEADBEEF"), Some(0xDEADBEEF));
        assert_eq!(decode(b"TORRENTZIPPED-deadbeef"), Some(0xDEADBEEF));
    }

    #[test]
    fn decode_rejects_everything_else() {
        assert_eq!(decode(b""), None);
        assert_eq!(decode(b"TORRENTZIPPED-DEADBEE"), None);
        assert_eq!(decode(b"TORRENTZIPPED-DEADBEEF0"), None);
        assert_eq!(decode(b"TORRENTZIPPED-DEADBEEG"), None);
        assert_eq!(decode(b"TORRENTZIPPED- DEADBEE"), None);
        assert_eq!(decode(b"TORRENTZIPPED-+DEADBEE"), None);
        assert_eq!(decode(b"TORRENTZIPPED-0x12345A"), None);
        assert_eq!(decode(b"torrentzipped-DEADBEEF"), None);
        assert_eq!(decode(b"SOMETHINGELSE!DEADBEEF"), None);
    }

    #[test]
    fn checksum_matches_plain_crc32() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(checksum(&data), crc32fast::hash(&data));
        assert_eq!(checksum(b""), 0);
    }

    #[tokio::test]
    async fn checksum_at_reads_in_chunks() {
        let data: Vec<u8> = (0..(3 * CHUNK_SIZE + 17)).map(|i| (i % 253) as u8).collect();
        let expected = crc32fast::hash(&data[5..5 + 2 * CHUNK_SIZE + 3]);
        let reader = MemoryReader::new(data);
        let actual = checksum_at(&reader, 5, (2 * CHUNK_SIZE + 3) as u64)
            .await
            .unwrap();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn checksum_at_fails_past_end() {
        let reader = MemoryReader::new(vec![0u8; 10]);
        assert!(checksum_at(&reader, 5, 10).await.is_err());
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in any::<u32>()) {
            prop_assert_eq!(decode(&encode(value)), Some(value));
        }
    }
}
