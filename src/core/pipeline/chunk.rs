//! Sender side of the pipeline: a pausable chunk sequence over a byte source.
//!
//! The reader yields fixed-size chunks read sequentially from the source.
//! After each partition (a size-capped run of chunks) it yields a
//! [`ReadStep::PartitionEnd`] and pauses; nothing more is read until
//! [`ChunkReader::start_partition`] is called again. The transfer layer
//! resumes it when the receiver acknowledges the partition, which bounds
//! how far the sender can run ahead of the receiver.
//!
//! ```text
//!  start_partition ─► Chunk … Chunk ─► PartitionEnd ─► (paused)
//!  start_partition ─► Chunk … Chunk ─► Finished      ─► (done)
//! ```
//!
//! A chunk never straddles a partition boundary or the end of the file,
//! so every partition except the last is exactly `partition_size` bytes.

use crate::core::error::TransferError;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

/// One step of the chunk sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadStep {
    /// The next chunk of file data.
    Chunk(Bytes),
    /// The partition cap was reached at `offset`; the reader is now paused.
    PartitionEnd { offset: u64 },
    /// The whole file has been read. Yielded exactly once.
    Finished { offset: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Reading,
    Paused,
    Done,
}

/// Restartable, finite, pausable chunk sequence.
pub struct ChunkReader<R> {
    source: R,
    size: u64,
    offset: u64,
    partition_bytes: u64,
    chunk_size: usize,
    partition_size: u64,
    state: ReaderState,
}

impl<R: AsyncRead + Unpin + Send> ChunkReader<R> {
    /// Create a paused reader over `source`, which must hold `size` bytes.
    pub fn new(source: R, size: u64, chunk_size: usize, partition_size: u64) -> Self {
        Self {
            source,
            size,
            offset: 0,
            partition_bytes: 0,
            chunk_size: chunk_size.max(1),
            partition_size: partition_size.max(1),
            state: ReaderState::Paused,
        }
    }

    /// Reset the partition counter and resume emitting chunks.
    ///
    /// No-op once the file end has been reported.
    pub fn start_partition(&mut self) {
        if self.state == ReaderState::Done {
            return;
        }
        self.partition_bytes = 0;
        self.state = ReaderState::Reading;
    }

    /// Produce the next step, or `None` while paused or after [`ReadStep::Finished`].
    pub async fn next_step(&mut self) -> Result<Option<ReadStep>, TransferError> {
        if self.state != ReaderState::Reading {
            return Ok(None);
        }

        if self.offset >= self.size {
            self.state = ReaderState::Done;
            return Ok(Some(ReadStep::Finished {
                offset: self.offset,
            }));
        }

        if self.partition_bytes >= self.partition_size {
            self.state = ReaderState::Paused;
            return Ok(Some(ReadStep::PartitionEnd {
                offset: self.offset,
            }));
        }

        let len = (self.chunk_size as u64)
            .min(self.size - self.offset)
            .min(self.partition_size - self.partition_bytes) as usize;

        let mut buf = vec![0u8; len];
        if let Err(e) = self.source.read_exact(&mut buf).await {
            self.state = ReaderState::Done;
            return Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransferError::SourceTruncated {
                    offset: self.offset,
                    size: self.size,
                }
            } else {
                e.into()
            });
        }

        self.offset += len as u64;
        self.partition_bytes += len as u64;
        Ok(Some(ReadStep::Chunk(Bytes::from(buf))))
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_paused(&self) -> bool {
        self.state == ReaderState::Paused
    }

    pub fn is_finished(&self) -> bool {
        self.state == ReaderState::Done
    }

    /// Fraction of the file read so far.
    pub fn progress(&self) -> f64 {
        if self.size == 0 {
            1.0
        } else {
            self.offset as f64 / self.size as f64
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CHUNK_SIZE, PARTITION_SIZE};
    use std::io::Cursor;

    /// Drain the reader, resuming after every partition end.
    /// Returns chunk counts per partition, the partition boundaries and the bytes read.
    async fn drain<R: AsyncRead + Unpin + Send>(
        reader: &mut ChunkReader<R>,
    ) -> (Vec<usize>, Vec<u64>, Vec<u8>) {
        let mut per_partition = vec![0usize];
        let mut boundaries = Vec::new();
        let mut data = Vec::new();

        reader.start_partition();
        loop {
            match reader.next_step().await.unwrap() {
                Some(ReadStep::Chunk(c)) => {
                    *per_partition.last_mut().unwrap() += 1;
                    data.extend_from_slice(&c);
                }
                Some(ReadStep::PartitionEnd { offset }) => {
                    boundaries.push(offset);
                    per_partition.push(0);
                    assert!(reader.is_paused());
                    assert_eq!(reader.next_step().await.unwrap(), None);
                    reader.start_partition();
                }
                Some(ReadStep::Finished { offset }) => {
                    boundaries.push(offset);
                    break;
                }
                None => panic!("reader stalled while reading"),
            }
        }
        (per_partition, boundaries, data)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn partitions_for_two_and_a_half_megabytes() {
        let src = pattern(2_500_000);
        let mut reader =
            ChunkReader::new(Cursor::new(src.clone()), 2_500_000, CHUNK_SIZE, PARTITION_SIZE);

        let (per_partition, boundaries, data) = drain(&mut reader).await;

        assert_eq!(per_partition, vec![16, 16, 8]);
        assert_eq!(per_partition.iter().sum::<usize>(), 40);
        assert_eq!(boundaries, vec![1_000_000, 2_000_000, 2_500_000]);
        assert_eq!(reader.offset(), 2_500_000);
        assert_eq!(data, src);
        assert!(reader.is_finished());
        assert_eq!(reader.next_step().await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_end_on_partition_boundary_has_no_extra_pause() {
        let mut reader = ChunkReader::new(Cursor::new(vec![7u8; 2_000]), 2_000, 300, 1_000);
        let (per_partition, boundaries, _) = drain(&mut reader).await;
        assert_eq!(boundaries, vec![1_000, 2_000]);
        assert_eq!(per_partition, vec![4, 4]);
    }

    #[tokio::test]
    async fn chunk_count_matches_ceiling_when_aligned() {
        // chunk size divides the partition size
        let size = 10_250u64;
        let mut reader = ChunkReader::new(Cursor::new(pattern(size as usize)), size, 500, 2_000);
        let (per_partition, boundaries, data) = drain(&mut reader).await;
        assert_eq!(per_partition.iter().sum::<usize>(), size.div_ceil(500) as usize);
        assert_eq!(boundaries.len() as u64, size.div_ceil(2_000));
        assert_eq!(data.len() as u64, size);
    }

    #[tokio::test]
    async fn empty_source_finishes_immediately() {
        let mut reader = ChunkReader::new(Cursor::new(Vec::new()), 0, CHUNK_SIZE, PARTITION_SIZE);
        assert_eq!(reader.progress(), 1.0);
        reader.start_partition();
        assert_eq!(
            reader.next_step().await.unwrap(),
            Some(ReadStep::Finished { offset: 0 })
        );
        assert_eq!(reader.next_step().await.unwrap(), None);
    }

    #[tokio::test]
    async fn paused_until_started() {
        let mut reader = ChunkReader::new(Cursor::new(vec![1u8; 10]), 10, 4, 100);
        assert_eq!(reader.next_step().await.unwrap(), None);
        reader.start_partition();
        assert!(matches!(reader.next_step().await.unwrap(), Some(ReadStep::Chunk(c)) if c.len() == 4));
        assert!((reader.progress() - 0.4).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn truncated_source_is_an_error() {
        let mut reader = ChunkReader::new(Cursor::new(vec![1u8; 5]), 10, 8, 100);
        reader.start_partition();
        let err = reader.next_step().await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::SourceTruncated { offset: 0, size: 10 }
        ));
        assert!(reader.is_finished());
    }
}
