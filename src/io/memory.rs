use super::ReadAt;
use anyhow::Result;
use async_trait::async_trait;

/// Random access over an archive already held in memory
pub struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn short_reads_at_end_of_data() {
        let reader = MemoryReader::new(b"PK\x05\x06".to_vec());
        let mut buf = [0u8; 8];
        assert_eq!(reader.read_at(2, &mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"\x05\x06");
        assert_eq!(reader.read_at(9, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn read_exact_at_rejects_truncated_source() {
        let reader = MemoryReader::new(vec![1, 2, 3]);
        let mut buf = [0u8; 4];
        assert!(reader.read_exact_at(0, &mut buf).await.is_err());

        let mut buf = [0u8; 2];
        reader.read_exact_at(1, &mut buf).await.unwrap();
        assert_eq!(buf, [2, 3]);
    }
}
