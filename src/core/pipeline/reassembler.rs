//! Receiver side of the pipeline: collects chunks into one file blob.

use crate::core::error::TransferError;
use bytes::{Bytes, BytesMut};

/// Metadata announced by a `header` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub name: String,
    pub mime: String,
    pub size: u64,
}

/// A fully received file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub data: Bytes,
}

/// Accumulates chunks against a declared size.
///
/// Completion fires exactly once: the call that brings the byte count to
/// the declared size returns the assembled file, later chunks are rejected.
#[derive(Debug)]
pub struct Reassembler {
    header: FileHeader,
    chunks: Vec<Bytes>,
    received: u64,
    completed: bool,
}

impl Reassembler {
    pub fn new(header: FileHeader) -> Self {
        Self {
            header,
            chunks: Vec::new(),
            received: 0,
            completed: false,
        }
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Fraction of the declared size received. A zero-size file counts as done.
    pub fn progress(&self) -> f64 {
        if self.header.size == 0 {
            return 1.0;
        }
        (self.received as f64 / self.header.size as f64).min(1.0)
    }

    /// Append one chunk. Returns the assembled file when this chunk
    /// completes it.
    pub fn accept(&mut self, chunk: Bytes) -> Result<Option<ReceivedFile>, TransferError> {
        if self.completed {
            return Err(TransferError::UnexpectedChunk);
        }

        let received = self.received + chunk.len() as u64;
        if received > self.header.size {
            return Err(TransferError::SizeMismatch {
                declared: self.header.size,
                received,
            });
        }

        self.received = received;
        self.chunks.push(chunk);
        Ok(self.completion())
    }

    /// Return the assembled file if the declared size has been reached and
    /// completion has not fired yet.
    ///
    /// Only needed directly for zero-size files, which complete without
    /// any chunk.
    pub fn completion(&mut self) -> Option<ReceivedFile> {
        if self.completed || self.received < self.header.size {
            return None;
        }
        self.completed = true;

        let mut blob = BytesMut::with_capacity(self.received as usize);
        for chunk in std::mem::take(&mut self.chunks) {
            blob.extend_from_slice(&chunk);
        }

        Some(ReceivedFile {
            name: self.header.name.clone(),
            mime: self.header.mime.clone(),
            size: self.header.size,
            data: blob.freeze(),
        })
    }
}
