use std::{
    fs::File,
    io::{self, Write},
    path::Path,
    sync::Mutex,
};

use tracing::{debug, trace, warn};

use crate::{
    compressor::{StreamCompressor, ZstdCompressor},
    config::MAX_MIN_FRAME_SIZE,
    frame::{self, FrameAccumulator},
    seek_table::{FrameLog, CHECKSUM_SENTINEL},
    ArchiveError, Result, Sink, WriterConfig,
};

/// Seek table is drained through a window of this size.
const SEEK_TABLE_BUF: usize = 4096;

/// What a successful [`ArchiveWriter::close`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseSummary {
    pub frames: usize,
    pub uncompressed_bytes: u64,
    /// Frame bytes only, excluding the seek table
    pub compressed_bytes: u64,
    pub seek_table_bytes: u64,
}

/// Lock-protected session state. Fields drop in reverse acquisition order.
struct Session<S, C> {
    sink: S,
    frame_log: FrameLog,
    compressor: C,
    frame: FrameAccumulator,
    out_buf: Vec<u8>,
}

impl<S: Sink, C: StreamCompressor> Session<S, C> {
    fn write(&mut self, input: &[u8], min_frame_size: usize) -> Result<()> {
        if self.frame.should_end(min_frame_size) {
            // flushes everything dispatched by earlier calls
            self.end_frame()?;
        }

        frame::compress_into(
            &mut self.compressor,
            &mut self.sink,
            &mut self.out_buf,
            &mut self.frame,
            input,
        )?;
        self.frame.add_uncompressed(input.len());
        Ok(())
    }

    /// Must run with the session lock held (or with the session owned).
    fn end_frame(&mut self) -> Result<()> {
        frame::drain_frame(
            &mut self.compressor,
            &mut self.sink,
            &mut self.out_buf,
            &mut self.frame,
        )?;
        self.frame_log.log_frame(
            self.frame.compressed(),
            self.frame.uncompressed(),
            CHECKSUM_SENTINEL,
        )?;

        let (compressed, uncompressed) = self.frame.reset();
        trace!(
            frame = self.frame_log.len() - 1,
            compressed,
            uncompressed,
            "frame logged"
        );
        Ok(())
    }
}

/// Writes a seekable zstd archive.
///
/// Input is cut into independent frames of at least `min_frame_size`
/// uncompressed bytes (a frame may overshoot by one `write`), and a seek
/// table listing every frame is appended by [`close`](Self::close).
///
/// `write` takes `&self` and may be called from many threads; calls are
/// serialized by an internal lock.
pub struct ArchiveWriter<S = File, C = ZstdCompressor> {
    inner: Mutex<Session<S, C>>,
    min_frame_size: usize,
}

impl ArchiveWriter {
    /// Creates (truncating) `path` and a compression context configured from `config`.
    ///
    /// Resources are acquired in order: compression context (level, strategy,
    /// workers), frame log, output file. On failure everything already acquired
    /// is released before returning.
    pub fn open(path: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;

        let compressor = ZstdCompressor::new(&config)?;
        let frame_log = FrameLog::new();
        let sink = File::create(path).map_err(|e| ArchiveError::Resource {
            context: format!("create {}", path.display()),
            source: Some(e),
        })?;

        debug!(
            path = %path.display(),
            level = config.level,
            strategy = %config.strategy,
            workers = config.workers,
            min_frame_size = config.min_frame_size,
            "archive writer opened"
        );
        Ok(Self::from_session(
            sink,
            compressor,
            frame_log,
            config.min_frame_size,
        ))
    }

    /// [`open`](Self::open) with default level and strategy.
    pub fn create(path: impl AsRef<Path>, workers: u32, min_frame_size: usize) -> Result<Self> {
        Self::open(path, WriterConfig::new(workers, min_frame_size))
    }
}

impl<S: Sink, C: StreamCompressor> ArchiveWriter<S, C> {
    /// Builds a writer around an already-opened sink and compressor.
    ///
    /// `min_frame_size` is capped at [`MAX_MIN_FRAME_SIZE`].
    pub fn with_parts(sink: S, compressor: C, min_frame_size: usize) -> Self {
        Self::from_session(
            sink,
            compressor,
            FrameLog::new(),
            min_frame_size.min(MAX_MIN_FRAME_SIZE),
        )
    }

    fn from_session(sink: S, compressor: C, frame_log: FrameLog, min_frame_size: usize) -> Self {
        let out_buf = vec![0u8; compressor.out_size()];
        Self {
            inner: Mutex::new(Session {
                sink,
                frame_log,
                compressor,
                frame: FrameAccumulator::default(),
                out_buf,
            }),
            min_frame_size,
        }
    }

    pub fn min_frame_size(&self) -> usize {
        self.min_frame_size
    }

    /// Appends `buf` to the current frame.
    ///
    /// If the current frame already holds `min_frame_size` bytes it is closed
    /// first, which blocks until its compressed bytes are on the sink. Either
    /// all of `buf` is accepted or an error is returned; bytes already written
    /// to the sink are not rolled back, and the writer should be abandoned
    /// after any error.
    pub fn write(&self, buf: &[u8]) -> Result<()> {
        let mut session = self
            .inner
            .lock()
            .map_err(|_| ArchiveError::Sync("lock writer: poisoned".to_string()))?;
        session.write(buf, self.min_frame_size).inspect_err(|e| {
            warn!(kind = %e.kind(), "archive write failed: {e}");
        })
    }

    /// Ends the pending frame, appends the seek table and closes the sink.
    ///
    /// Consuming `self` guarantees no `write` is in flight. Writers shared
    /// through an `Arc` must be unwrapped first (`Arc::try_unwrap`). The
    /// first failing step is returned; remaining resources are still released
    /// when they go out of scope.
    pub fn close(self) -> Result<CloseSummary> {
        let mut session = self
            .inner
            .into_inner()
            .map_err(|_| ArchiveError::Sync("take writer state: poisoned".to_string()))?;

        if session.frame.has_pending() {
            session.end_frame().inspect_err(|e| {
                warn!(kind = %e.kind(), "end final frame failed: {e}");
            })?;
        }

        let Session {
            mut sink,
            mut frame_log,
            compressor,
            ..
        } = session;

        let mut buf = [0u8; SEEK_TABLE_BUF];
        let mut seek_table_bytes = 0u64;
        loop {
            let (written, remaining) = frame_log.write_seek_table(&mut buf)?;
            sink.write_all(&buf[..written])
                .map_err(|e| ArchiveError::io("write seek table", e))?;
            seek_table_bytes += written as u64;
            if remaining == 0 {
                break;
            }
        }

        sink.close()
            .map_err(|e| ArchiveError::io("close sink", e))?;
        drop(sink);

        let summary = CloseSummary {
            frames: frame_log.len(),
            uncompressed_bytes: frame_log
                .frames()
                .iter()
                .map(|f| f.uncompressed_size as u64)
                .sum(),
            compressed_bytes: frame_log
                .frames()
                .iter()
                .map(|f| f.compressed_size as u64)
                .sum(),
            seek_table_bytes,
        };

        drop(frame_log);
        drop(compressor);

        debug!(
            frames = summary.frames,
            uncompressed = summary.uncompressed_bytes,
            compressed = summary.compressed_bytes,
            "archive writer closed"
        );
        Ok(summary)
    }
}

impl<S: Sink, C: StreamCompressor> Write for &ArchiveWriter<S, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ArchiveWriter::write(*self, buf)?;
        Ok(buf.len())
    }

    /// Frames are only flushed at frame boundaries and on close.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Sink, C: StreamCompressor> Write for ArchiveWriter<S, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        <&Self as Write>::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
