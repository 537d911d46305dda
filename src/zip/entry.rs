//! Streaming, verified decompression of a single archive member.

use flate2::{Decompress, FlushDecompress, Status};
use thiserror::Error;

use crate::io::ReadAt;

use super::structures::{CompressionMethod, ZipFileEntry};

/// Size of the compressed input window read from the archive per refill.
const INPUT_CHUNK: usize = 64 * 1024;

/// Problems found while decoding an entry's data.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("read failed: {0}")]
    Io(#[source] anyhow::Error),
    #[error("compressed data ends early")]
    Truncated,
    #[error("invalid deflate data: {0}")]
    Corrupt(String),
    #[error("CRC error (expected {expected:08X}, found {actual:08X})")]
    CrcMismatch { expected: u32, actual: u32 },
    #[error("size mismatch (expected {expected} bytes, found {actual})")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// Pull-style reader producing an entry's decompressed bytes.
///
/// The CRC-32 and uncompressed size are checked against the central
/// directory once the data is exhausted; a mismatch is reported by the
/// final `read` call instead of end of data.
pub struct EntryReader<'a, R: ReadAt> {
    reader: &'a R,
    inflater: Option<Decompress>,
    /// Next compressed byte to fetch
    offset: u64,
    /// Compressed bytes not fetched yet
    remaining: u64,
    input: Vec<u8>,
    input_pos: usize,
    hasher: crc32fast::Hasher,
    produced: u64,
    expected_crc: u32,
    expected_size: u64,
    finished: bool,
}

impl<'a, R: ReadAt> EntryReader<'a, R> {
    pub(crate) fn new(reader: &'a R, entry: &ZipFileEntry, data_offset: u64) -> Self {
        let inflater = match entry.compression_method {
            CompressionMethod::Deflate => Some(Decompress::new(false)),
            _ => None,
        };
        Self {
            reader,
            inflater,
            offset: data_offset,
            remaining: entry.compressed_size,
            input: Vec::new(),
            input_pos: 0,
            hasher: crc32fast::Hasher::new(),
            produced: 0,
            expected_crc: entry.crc32,
            expected_size: entry.uncompressed_size,
            finished: false,
        }
    }

    /// Decompressed bytes handed out so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// Read decompressed data into `buf`; `Ok(0)` means the entry is done
    /// and verified.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, EntryError> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }

        let n = if self.inflater.is_some() {
            self.read_deflated(buf).await?
        } else {
            self.read_stored(buf).await?
        };

        if n == 0 {
            self.finished = true;
            self.verify()?;
        } else {
            self.hasher.update(&buf[..n]);
            self.produced += n as u64;
        }
        Ok(n)
    }

    async fn read_stored(&mut self, buf: &mut [u8]) -> Result<usize, EntryError> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self
            .reader
            .read_at(self.offset, &mut buf[..want])
            .await
            .map_err(EntryError::Io)?;
        if n == 0 {
            return Err(EntryError::Truncated);
        }
        self.offset += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }

    async fn refill(&mut self) -> Result<(), EntryError> {
        let want = INPUT_CHUNK.min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        self.input.resize(want, 0);
        self.reader
            .read_exact_at(self.offset, &mut self.input)
            .await
            .map_err(|_| EntryError::Truncated)?;
        self.offset += want as u64;
        self.remaining -= want as u64;
        self.input_pos = 0;
        Ok(())
    }

    async fn read_deflated(&mut self, buf: &mut [u8]) -> Result<usize, EntryError> {
        loop {
            if self.input_pos == self.input.len() && self.remaining > 0 {
                self.refill().await?;
            }

            let Some(inflater) = self.inflater.as_mut() else {
                return Ok(0);
            };
            let before_in = inflater.total_in();
            let before_out = inflater.total_out();
            let status = inflater
                .decompress(&self.input[self.input_pos..], buf, FlushDecompress::None)
                .map_err(|e| EntryError::Corrupt(e.to_string()))?;
            let consumed = (inflater.total_in() - before_in) as usize;
            let written = (inflater.total_out() - before_out) as usize;
            self.input_pos += consumed;

            if written > 0 {
                return Ok(written);
            }
            if status == Status::StreamEnd {
                return Ok(0);
            }
            let exhausted = self.input_pos == self.input.len() && self.remaining == 0;
            if exhausted {
                return Err(EntryError::Truncated);
            }
            if consumed == 0 && self.input_pos < self.input.len() {
                return Err(EntryError::Corrupt("decoder made no progress".to_string()));
            }
        }
    }

    fn verify(&self) -> Result<(), EntryError> {
        if self.produced != self.expected_size {
            return Err(EntryError::SizeMismatch {
                expected: self.expected_size,
                actual: self.produced,
            });
        }
        let actual = self.hasher.clone().finalize();
        if actual != self.expected_crc {
            return Err(EntryError::CrcMismatch {
                expected: self.expected_crc,
                actual,
            });
        }
        Ok(())
    }
}
