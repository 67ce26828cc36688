//! Streaming compressor seam.
//!
//! The writer only ever talks to a [`StreamCompressor`]: hand it input and an
//! output window, get back how much was consumed, produced, and still pending.

use zstd::zstd_safe::{zstd_sys::ZSTD_EndDirective, CCtx, CParameter, InBuffer, OutBuffer};

use crate::{ArchiveError, Result, WriterConfig};

/// How far the compressor should go on a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Keep the frame open; buffer as the engine sees fit.
    Continue,
    /// Flush everything and terminate the current frame.
    End,
}

/// Outcome of one compressor call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Input bytes consumed
    pub consumed: usize,
    /// Output bytes written into the window
    pub produced: usize,
    /// Bytes still waiting to be flushed (0 once an `End` drain is complete)
    pub pending: usize,
}

pub trait StreamCompressor {
    fn compress(&mut self, input: &[u8], output: &mut [u8], mode: FlushMode) -> Result<Progress>;

    /// Output window size the writer should allocate.
    fn out_size(&self) -> usize {
        CCtx::out_size()
    }
}

/// zstd streaming context configured once at construction.
pub struct ZstdCompressor {
    cctx: CCtx<'static>,
}

impl ZstdCompressor {
    /// Creates the context and applies level, strategy and worker hint, in that order.
    pub fn new(config: &WriterConfig) -> Result<Self> {
        let mut cctx = CCtx::try_create().ok_or_else(|| ArchiveError::Resource {
            context: "create compression context".to_string(),
            source: None,
        })?;

        cctx.set_parameter(CParameter::CompressionLevel(config.level))
            .map_err(|code| ArchiveError::zstd("set compression level", code))?;
        cctx.set_parameter(CParameter::Strategy(config.strategy.to_zstd()))
            .map_err(|code| ArchiveError::zstd("set strategy", code))?;
        cctx.set_parameter(CParameter::NbWorkers(config.workers))
            .map_err(|code| ArchiveError::zstd("set nb of workers", code))?;

        Ok(Self { cctx })
    }
}

impl StreamCompressor for ZstdCompressor {
    fn compress(&mut self, input: &[u8], output: &mut [u8], mode: FlushMode) -> Result<Progress> {
        let directive = match mode {
            FlushMode::Continue => ZSTD_EndDirective::ZSTD_e_continue,
            FlushMode::End => ZSTD_EndDirective::ZSTD_e_end,
        };

        let mut inb = InBuffer::around(input);
        let mut outb = OutBuffer::around(output);
        let pending = self
            .cctx
            .compress_stream2(&mut outb, &mut inb, directive)
            .map_err(|code| ArchiveError::zstd("compress", code))?;

        Ok(Progress {
            consumed: inb.pos(),
            produced: outb.pos(),
            pending,
        })
    }
}
