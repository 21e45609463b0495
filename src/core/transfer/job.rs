//! Outbound file jobs.

use crate::core::config::DEFAULT_MIME;
use crate::core::pipeline::{ChunkReader, FileHeader};
use anyhow::{Context, Result};
use bytes::Bytes;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use uuid::Uuid;

/// Byte source of a queued file.
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Bytes sniffed from the start of a file for MIME detection.
const MIME_SNIFF_LEN: usize = 8192;

/// A file waiting to be sent (or being sent) to one peer.
pub struct TransferJob {
    pub id: Uuid,
    pub name: String,
    pub mime: String,
    pub size: u64,
    source: ByteSource,
}

impl TransferJob {
    pub fn new(
        name: impl Into<String>,
        mime: impl Into<String>,
        size: u64,
        source: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mime: mime.into(),
            size,
            source: Box::new(source),
        }
    }

    /// Job over an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, mime: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let size = data.len() as u64;
        Self::new(name, mime, size, Cursor::new(data))
    }

    /// Job over a file on disk. The MIME type is sniffed from its first bytes.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        let size = file.metadata().await?.len();

        let mut head = vec![0u8; MIME_SNIFF_LEN.min(size as usize)];
        file.read_exact(&mut head).await?;
        file.rewind().await?;

        let mime = infer::get(&head)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| DEFAULT_MIME.to_string());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());

        Ok(Self::new(name, mime, size, file))
    }

    pub fn header(&self) -> FileHeader {
        FileHeader {
            name: self.name.clone(),
            mime: self.mime.clone(),
            size: self.size,
        }
    }

    pub(crate) fn into_reader(self, chunk_size: usize, partition_size: u64) -> ChunkReader<ByteSource> {
        ChunkReader::new(self.source, self.size, chunk_size, partition_size)
    }
}

impl fmt::Debug for TransferJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferJob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("peerdrop_test").join("job").join(name);
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn from_path_reads_size_and_sniffs_mime() {
        let dir = test_dir("sniff");
        let path = dir.join("image.bin");
        // PNG signature followed by padding
        let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend(std::iter::repeat(0u8).take(100));
        std::fs::write(&path, &data).unwrap();

        let job = TransferJob::from_path(&path).await.unwrap();
        assert_eq!(job.name, "image.bin");
        assert_eq!(job.size, data.len() as u64);
        assert_eq!(job.mime, "image/png");

        // the sniffed bytes are still delivered
        let mut reader = job.into_reader(1024, 4096);
        reader.start_partition();
        match reader.next_step().await.unwrap() {
            Some(crate::core::pipeline::ReadStep::Chunk(c)) => assert_eq!(&c[..], &data[..]),
            other => panic!("unexpected step: {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unknown_content_falls_back_to_octet_stream() {
        let dir = test_dir("fallback");
        let path = dir.join("notes.txt");
        std::fs::write(&path, b"plain words").unwrap();

        let job = TransferJob::from_path(&path).await.unwrap();
        assert_eq!(job.mime, DEFAULT_MIME);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("peerdrop_test_does_not_exist.bin");
        assert!(TransferJob::from_path(&path).await.is_err());
    }
}
