//! Current-frame bookkeeping and the two compressor drain loops.

use tracing::trace;

use crate::{
    compressor::{FlushMode, StreamCompressor},
    ArchiveError, Result, Sink,
};

/// Byte counters for the frame being built.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameAccumulator {
    uncompressed: u64,
    compressed: u64,
}

impl FrameAccumulator {
    #[inline]
    pub fn uncompressed(&self) -> u64 {
        self.uncompressed
    }

    #[inline]
    pub fn compressed(&self) -> u64 {
        self.compressed
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        self.uncompressed > 0
    }

    /// Boundary check made at the start of a write. Never true for an empty frame.
    #[inline]
    pub fn should_end(&self, min_frame_size: usize) -> bool {
        self.has_pending() && self.uncompressed >= min_frame_size as u64
    }

    #[inline]
    pub(crate) fn add_compressed(&mut self, n: usize) {
        self.compressed += n as u64;
    }

    #[inline]
    pub(crate) fn add_uncompressed(&mut self, n: usize) {
        self.uncompressed += n as u64;
    }

    /// Returns `(compressed, uncompressed)` and zeroes both counters.
    pub(crate) fn reset(&mut self) -> (u64, u64) {
        let out = (self.compressed, self.uncompressed);
        *self = Self::default();
        out
    }
}

/// Feeds all of `input` to the compressor in `Continue` mode, writing every
/// produced chunk to the sink as it appears.
pub(crate) fn compress_into<C, S>(
    compressor: &mut C,
    sink: &mut S,
    buf: &mut [u8],
    frame: &mut FrameAccumulator,
    input: &[u8],
) -> Result<()>
where
    C: StreamCompressor,
    S: Sink,
{
    let mut rest = input;
    loop {
        let p = compressor.compress(rest, buf, FlushMode::Continue)?;
        frame.add_compressed(p.produced);
        sink.write_all(&buf[..p.produced])
            .map_err(|e| ArchiveError::io("write frame data", e))?;

        rest = &rest[p.consumed..];
        if rest.is_empty() {
            return Ok(());
        }
    }
}

/// Flushes and closes the current frame. Blocks until the compressor (and any
/// of its workers) has nothing left for this frame.
pub(crate) fn drain_frame<C, S>(
    compressor: &mut C,
    sink: &mut S,
    buf: &mut [u8],
    frame: &mut FrameAccumulator,
) -> Result<()>
where
    C: StreamCompressor,
    S: Sink,
{
    loop {
        let p = compressor.compress(&[], buf, FlushMode::End)?;
        frame.add_compressed(p.produced);
        sink.write_all(&buf[..p.produced])
            .map_err(|e| ArchiveError::io("write frame end", e))?;
        trace!(produced = p.produced, pending = p.pending, "end frame step");

        if p.pending == 0 {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::Progress;

    /// Copies input through unchanged, a few bytes at a time, and pretends
    /// `End` needs `tail` extra steps.
    struct Passthrough {
        step: usize,
        tail: usize,
    }

    impl StreamCompressor for Passthrough {
        fn compress(&mut self, input: &[u8], output: &mut [u8], mode: FlushMode) -> Result<Progress> {
            match mode {
                FlushMode::Continue => {
                    let n = input.len().min(self.step).min(output.len());
                    output[..n].copy_from_slice(&input[..n]);
                    Ok(Progress { consumed: n, produced: n, pending: 0 })
                }
                FlushMode::End => {
                    output[0] = b'|';
                    self.tail = self.tail.saturating_sub(1);
                    Ok(Progress { consumed: 0, produced: 1, pending: self.tail })
                }
            }
        }

        fn out_size(&self) -> usize {
            16
        }
    }

    #[test]
    fn should_end_requires_pending_bytes() {
        let mut f = FrameAccumulator::default();
        assert!(!f.should_end(0));
        f.add_uncompressed(1);
        assert!(f.should_end(0));
        assert!(f.should_end(1));
        assert!(!f.should_end(2));
    }

    #[test]
    fn reset_zeroes_both_counters() {
        let mut f = FrameAccumulator::default();
        f.add_uncompressed(10);
        f.add_compressed(4);
        assert_eq!(f.reset(), (4, 10));
        assert_eq!(f, FrameAccumulator::default());
    }

    #[test]
    fn compress_into_consumes_everything_in_steps() {
        let mut c = Passthrough { step: 3, tail: 0 };
        let mut sink = Vec::new();
        let mut buf = vec![0u8; c.out_size()];
        let mut f = FrameAccumulator::default();

        compress_into(&mut c, &mut sink, &mut buf, &mut f, b"abcdefghij").unwrap();
        assert_eq!(sink, b"abcdefghij");
        assert_eq!(f.compressed(), 10);
        // uncompressed is the caller's job
        assert_eq!(f.uncompressed(), 0);
    }

    #[test]
    fn compress_into_calls_once_for_empty_input() {
        let mut c = Passthrough { step: 3, tail: 0 };
        let mut sink = Vec::new();
        let mut buf = vec![0u8; 16];
        let mut f = FrameAccumulator::default();
        compress_into(&mut c, &mut sink, &mut buf, &mut f, &[]).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn drain_frame_loops_until_nothing_pending() {
        let mut c = Passthrough { step: 3, tail: 3 };
        let mut sink = Vec::new();
        let mut buf = vec![0u8; 16];
        let mut f = FrameAccumulator::default();
        drain_frame(&mut c, &mut sink, &mut buf, &mut f).unwrap();
        assert_eq!(sink, b"|||");
        assert_eq!(f.compressed(), 3);
    }
}
