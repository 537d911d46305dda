use super::ReadAt;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Positional reads on an archive stored on the local filesystem.
///
/// The size is taken once when the file is opened; the archive is not
/// expected to change while it is being read.
pub struct LocalFileReader {
    file: File,
    path: PathBuf,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
        let size = file
            .metadata()
            .with_context(|| format!("Cannot stat {}", path.display()))?
            .len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }

        #[cfg(unix)]
        let n = {
            use std::os::unix::fs::FileExt;
            self.file.read_at(buf, offset)
        };

        #[cfg(windows)]
        let n = {
            // Moves the cursor, which nothing else relies on
            use std::os::windows::fs::FileExt;
            self.file.seek_read(buf, offset)
        };

        #[cfg(not(any(unix, windows)))]
        let n = {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = &self.file;
            file.seek(SeekFrom::Start(offset))
                .and_then(|_| file.read(buf))
        };

        n.with_context(|| format!("Read of {} at offset {} failed", self.path.display(), offset))
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_at_any_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let reader = LocalFileReader::new(&path).unwrap();
        assert_eq!(reader.size(), 10);
        assert_eq!(reader.path(), path);

        let mut buf = [0u8; 4];
        reader.read_exact_at(6, &mut buf).await.unwrap();
        assert_eq!(&buf, b"6789");
        assert_eq!(reader.read_at(10, &mut buf).await.unwrap(), 0);
        assert!(reader.read_exact_at(8, &mut buf).await.is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = match LocalFileReader::new(Path::new("/nonexistent/archive.zip")) {
            Ok(_) => panic!("opened a missing file"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("archive.zip"));
    }
}
