//! Transfer pipeline: chunk production on the sender, reassembly on the receiver.

pub mod chunk;
pub mod reassembler;

pub use chunk::{ChunkReader, ReadStep};
pub use reassembler::{FileHeader, ReceivedFile, Reassembler};
