//! Seekable zstd archive writer.
//!
//! Streams bytes into independently compressed zstd frames and finishes the
//! archive with a seek table, so readers can jump to any uncompressed offset
//! by decompressing a single frame.

pub mod compressor;
pub mod config;
pub mod error;
pub mod frame;
pub mod seek_table;
pub mod sink;
pub mod writer;

pub use compressor::{FlushMode, Progress, StreamCompressor, ZstdCompressor};
pub use config::{Strategy, WriterConfig};
pub use error::{ArchiveError, ErrorKind, Result};
pub use seek_table::{FrameDescriptor, FrameLog, SeekTable};
pub use sink::Sink;
pub use writer::{ArchiveWriter, CloseSummary};
