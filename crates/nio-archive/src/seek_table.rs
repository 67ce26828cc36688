//! Frame log and the zstd seekable-format seek table.
//!
//! Layout, all integers little-endian, appended once after the last frame:
//!
//! ```text
//! skippable header  magic 0x184D2A5E (u32) | frame_size (u32)
//! entries           compressed (u32) | decompressed (u32) [| checksum (u32)]
//! footer            frame_count (u32) | descriptor (u8) | magic 0x8F92EAB1 (u32)
//! ```
//!
//! The whole table is itself a zstd skippable frame, so plain zstd decoders
//! read a seekable archive as an ordinary multi-frame stream.

use tracing::trace;

use crate::{ArchiveError, Result};

pub const SKIPPABLE_MAGIC: u32 = 0x184D_2A5E;
pub const SEEKABLE_MAGIC: u32 = 0x8F92_EAB1;
pub const MAX_FRAMES: usize = 0x0800_0000;

/// Checksum stored for every frame; per-frame checksums are not computed.
pub const CHECKSUM_SENTINEL: u32 = 0;

const SKIPPABLE_HEADER_LEN: usize = 8;
const FOOTER_LEN: usize = 9;
const CHECKSUM_FLAG: u8 = 0x80;
const RESERVED_BITS: u8 = 0x7C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub checksum: u32,
}

#[inline]
fn entry_len(checksum_flag: bool) -> usize {
    if checksum_flag {
        12
    } else {
        8
    }
}

/// Size in bytes of an encoded seek table with `frames` entries.
pub fn encoded_len(frames: usize, checksum_flag: bool) -> usize {
    SKIPPABLE_HEADER_LEN + frames * entry_len(checksum_flag) + FOOTER_LEN
}

/// Finalized frames in the order they were closed.
///
/// Per-frame checksums are not computed, so the table is always written with
/// the checksum flag cleared.
#[derive(Debug, Default)]
pub struct FrameLog {
    frames: Vec<FrameDescriptor>,
    encoded: Option<Vec<u8>>,
    pos: usize,
}

impl FrameLog {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[FrameDescriptor] {
        &self.frames
    }

    pub fn log_frame(&mut self, compressed: u64, uncompressed: u64, checksum: u32) -> Result<()> {
        if self.encoded.is_some() {
            return Err(ArchiveError::Codec(
                "frame logged after seek table emission started".to_string(),
            ));
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(ArchiveError::Codec(format!(
                "too many frames (max {MAX_FRAMES})"
            )));
        }
        let compressed_size = u32::try_from(compressed).map_err(|_| {
            ArchiveError::Codec(format!("compressed frame size {compressed} exceeds u32"))
        })?;
        let uncompressed_size = u32::try_from(uncompressed).map_err(|_| {
            ArchiveError::Codec(format!("uncompressed frame size {uncompressed} exceeds u32"))
        })?;

        self.frames.push(FrameDescriptor {
            compressed_size,
            uncompressed_size,
            checksum,
        });
        Ok(())
    }

    /// Copies the next part of the encoded seek table into `out`.
    ///
    /// Returns `(written, remaining)`; call again while `remaining > 0`. Once
    /// emission has started the log is frozen.
    pub fn write_seek_table(&mut self, out: &mut [u8]) -> Result<(usize, usize)> {
        if self.encoded.is_none() {
            self.encoded = Some(self.encode());
        }
        let encoded = self.encoded.as_deref().unwrap_or_default();

        let rest = &encoded[self.pos..];
        let n = rest.len().min(out.len());
        out[..n].copy_from_slice(&rest[..n]);
        self.pos += n;

        let remaining = encoded.len() - self.pos;
        trace!(written = n, remaining, "seek table step");
        Ok((n, remaining))
    }

    fn encode(&self) -> Vec<u8> {
        let total = encoded_len(self.frames.len(), false);
        let mut out = Vec::with_capacity(total);

        out.extend_from_slice(&SKIPPABLE_MAGIC.to_le_bytes());
        out.extend_from_slice(&((total - SKIPPABLE_HEADER_LEN) as u32).to_le_bytes());

        for f in &self.frames {
            out.extend_from_slice(&f.compressed_size.to_le_bytes());
            out.extend_from_slice(&f.uncompressed_size.to_le_bytes());
        }

        out.extend_from_slice(&(self.frames.len() as u32).to_le_bytes());
        out.push(0);
        out.extend_from_slice(&SEEKABLE_MAGIC.to_le_bytes());

        debug_assert_eq!(out.len(), total);
        out
    }
}

/// Decoded seek table with precomputed frame offsets.
#[derive(Debug, Clone)]
pub struct SeekTable {
    frames: Vec<FrameDescriptor>,
    checksum_flag: bool,
    /// compressed_starts[i] / uncompressed_starts[i]: where frame i begins; one extra trailing total
    compressed_starts: Vec<u64>,
    uncompressed_starts: Vec<u64>,
}

#[inline]
fn read_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

impl SeekTable {
    pub fn from_frames(frames: Vec<FrameDescriptor>, checksum_flag: bool) -> Self {
        let mut compressed_starts = Vec::with_capacity(frames.len() + 1);
        let mut uncompressed_starts = Vec::with_capacity(frames.len() + 1);
        let (mut c, mut u) = (0u64, 0u64);
        for f in &frames {
            compressed_starts.push(c);
            uncompressed_starts.push(u);
            c += f.compressed_size as u64;
            u += f.uncompressed_size as u64;
        }
        compressed_starts.push(c);
        uncompressed_starts.push(u);

        Self {
            frames,
            checksum_flag,
            compressed_starts,
            uncompressed_starts,
        }
    }

    /// Decodes the seek table that ends `data` (typically a whole archive).
    pub fn from_archive_tail(data: &[u8]) -> Result<Self> {
        let len = data.len();
        if len < SKIPPABLE_HEADER_LEN + FOOTER_LEN {
            return Err(ArchiveError::Codec(format!(
                "archive too short for a seek table ({len} bytes)"
            )));
        }

        if read_u32(data, len - 4) != SEEKABLE_MAGIC {
            return Err(ArchiveError::Codec("bad seekable magic".to_string()));
        }
        let descriptor = data[len - 5];
        if descriptor & RESERVED_BITS != 0 {
            return Err(ArchiveError::Codec(format!(
                "reserved descriptor bits set ({descriptor:#04x})"
            )));
        }
        let checksum_flag = descriptor & CHECKSUM_FLAG != 0;
        let n = read_u32(data, len - FOOTER_LEN) as usize;
        if n > MAX_FRAMES {
            return Err(ArchiveError::Codec(format!("frame count {n} exceeds {MAX_FRAMES}")));
        }

        let total = encoded_len(n, checksum_flag);
        if len < total {
            return Err(ArchiveError::Codec(format!(
                "seek table of {n} frames needs {total} bytes, archive has {len}"
            )));
        }

        let start = len - total;
        if read_u32(data, start) != SKIPPABLE_MAGIC {
            return Err(ArchiveError::Codec("bad skippable frame magic".to_string()));
        }
        let frame_size = read_u32(data, start + 4) as usize;
        if frame_size != total - SKIPPABLE_HEADER_LEN {
            return Err(ArchiveError::Codec(format!(
                "skippable frame size {frame_size} does not match {} entries",
                n
            )));
        }

        let stride = entry_len(checksum_flag);
        let mut frames = Vec::with_capacity(n);
        for i in 0..n {
            let at = start + SKIPPABLE_HEADER_LEN + i * stride;
            frames.push(FrameDescriptor {
                compressed_size: read_u32(data, at),
                uncompressed_size: read_u32(data, at + 4),
                checksum: if checksum_flag {
                    read_u32(data, at + 8)
                } else {
                    CHECKSUM_SENTINEL
                },
            });
        }

        let table = Self::from_frames(frames, checksum_flag);
        if table.compressed_size() > start as u64 {
            return Err(ArchiveError::Codec(format!(
                "frames claim {} compressed bytes, only {start} precede the seek table",
                table.compressed_size()
            )));
        }
        Ok(table)
    }

    pub fn frames(&self) -> &[FrameDescriptor] {
        &self.frames
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn checksum_flag(&self) -> bool {
        self.checksum_flag
    }

    /// Total bytes of frame data preceding the table.
    pub fn compressed_size(&self) -> u64 {
        *self.compressed_starts.last().unwrap_or(&0)
    }

    pub fn uncompressed_size(&self) -> u64 {
        *self.uncompressed_starts.last().unwrap_or(&0)
    }

    pub fn encoded_len(&self) -> usize {
        encoded_len(self.frames.len(), self.checksum_flag)
    }

    pub fn compressed_offset(&self, frame: usize) -> Option<u64> {
        (frame < self.frames.len()).then(|| self.compressed_starts[frame])
    }

    pub fn uncompressed_offset(&self, frame: usize) -> Option<u64> {
        (frame < self.frames.len()).then(|| self.uncompressed_starts[frame])
    }

    /// Byte range of frame `frame` within the archive.
    pub fn compressed_range(&self, frame: usize) -> Option<std::ops::Range<usize>> {
        let start = self.compressed_offset(frame)? as usize;
        Some(start..start + self.frames[frame].compressed_size as usize)
    }

    /// Maps an uncompressed offset to `(frame index, offset within that frame)`.
    pub fn locate(&self, offset: u64) -> Option<(usize, u64)> {
        if offset >= self.uncompressed_size() {
            return None;
        }
        // first frame whose end lies past the offset; skips empty frames
        let idx = self.uncompressed_starts[1..].partition_point(|&end| end <= offset);
        Some((idx, offset - self.uncompressed_starts[idx]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn encode_all(log: &mut FrameLog, chunk: usize) -> Vec<u8> {
        let mut buf = vec![0u8; chunk];
        let mut out = Vec::new();
        loop {
            let (n, remaining) = log.write_seek_table(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
            if remaining == 0 {
                return out;
            }
        }
    }

    #[test]
    fn empty_table_is_seventeen_bytes() {
        let mut log = FrameLog::new();
        let bytes = encode_all(&mut log, 4096);
        assert_eq!(bytes.len(), 17);
        assert_eq!(&bytes[..4], &SKIPPABLE_MAGIC.to_le_bytes());
        assert_eq!(read_u32(&bytes, 4), 9);
        assert_eq!(&bytes[13..], &SEEKABLE_MAGIC.to_le_bytes());

        let table = SeekTable::from_archive_tail(&bytes).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.uncompressed_size(), 0);
    }

    #[test]
    fn drains_through_a_small_window() {
        let mut log = FrameLog::new();
        for i in 0..100u64 {
            log.log_frame(10 + i, 100 + i, CHECKSUM_SENTINEL).unwrap();
        }
        let bytes = encode_all(&mut log, 7);
        assert_eq!(bytes.len(), encoded_len(100, false));

        // frame bytes must precede the table for decoding to pass
        let compressed: u64 = (0..100u64).map(|i| 10 + i).sum();
        let mut archive = vec![0u8; compressed as usize];
        archive.extend_from_slice(&bytes);

        let table = SeekTable::from_archive_tail(&archive).unwrap();
        assert_eq!(table.len(), 100);
        assert_eq!(table.frames()[42].uncompressed_size, 142);
        assert_eq!(table.compressed_size(), compressed);
        assert_eq!(table.compressed_offset(2), Some(10 + 11));
    }

    #[test]
    fn decodes_tables_carrying_checksums() {
        let mut table = Vec::new();
        table.extend_from_slice(&SKIPPABLE_MAGIC.to_le_bytes());
        table.extend_from_slice(&(12u32 + 9).to_le_bytes());
        for v in [3u32, 7, 0xDEAD_BEEF] {
            table.extend_from_slice(&v.to_le_bytes());
        }
        table.extend_from_slice(&1u32.to_le_bytes());
        table.push(CHECKSUM_FLAG);
        table.extend_from_slice(&SEEKABLE_MAGIC.to_le_bytes());

        let mut archive = vec![0u8; 3];
        archive.extend_from_slice(&table);
        let decoded = SeekTable::from_archive_tail(&archive).unwrap();
        assert!(decoded.checksum_flag());
        assert_eq!(decoded.encoded_len(), table.len());
        assert_eq!(
            decoded.frames()[0],
            FrameDescriptor {
                compressed_size: 3,
                uncompressed_size: 7,
                checksum: 0xDEAD_BEEF,
            }
        );
    }

    #[test]
    fn written_tables_have_checksum_flag_cleared() {
        let mut log = FrameLog::new();
        log.log_frame(4, 9, CHECKSUM_SENTINEL).unwrap();
        let bytes = encode_all(&mut log, 4096);
        assert_eq!(bytes.len(), encoded_len(1, false));
        assert_eq!(bytes[bytes.len() - 5], 0);
    }

    #[test]
    fn log_frame_rejects_oversized_frames() {
        let mut log = FrameLog::new();
        let err = log.log_frame(1, u32::MAX as u64 + 1, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
        assert!(log.is_empty());
    }

    #[test]
    fn log_is_frozen_once_emission_starts() {
        let mut log = FrameLog::new();
        log.log_frame(1, 1, 0).unwrap();
        let mut buf = [0u8; 4];
        log.write_seek_table(&mut buf).unwrap();
        assert_eq!(log.log_frame(1, 1, 0).unwrap_err().kind(), ErrorKind::Codec);
    }

    #[test]
    fn locate_skips_empty_frames() {
        let frames = [5u32, 0, 3]
            .iter()
            .map(|&u| FrameDescriptor {
                compressed_size: 1,
                uncompressed_size: u,
                checksum: 0,
            })
            .collect();
        let table = SeekTable::from_frames(frames, false);
        assert_eq!(table.locate(0), Some((0, 0)));
        assert_eq!(table.locate(4), Some((0, 4)));
        assert_eq!(table.locate(5), Some((2, 0)));
        assert_eq!(table.locate(7), Some((2, 2)));
        assert_eq!(table.locate(8), None);
    }

    #[test]
    fn rejects_corrupt_tails() {
        let mut log = FrameLog::new();
        log.log_frame(0, 0, 0).unwrap();
        let good = encode_all(&mut log, 64);

        let mut bad_magic = good.clone();
        let n = bad_magic.len();
        bad_magic[n - 1] ^= 0xFF;
        assert!(SeekTable::from_archive_tail(&bad_magic).is_err());

        let mut reserved = good.clone();
        reserved[n - 5] = 0x04;
        assert!(SeekTable::from_archive_tail(&reserved).is_err());

        let mut bad_size = good.clone();
        bad_size[4] = 0;
        assert!(SeekTable::from_archive_tail(&bad_size).is_err());

        assert!(SeekTable::from_archive_tail(&good[1..]).is_err());
        SeekTable::from_archive_tail(&good).unwrap();
    }
}
