use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
    time::{Duration, Instant},
};
use tracing::info;

use nio_archive::{ArchiveWriter, Strategy, WriterConfig};

use super::{format_duration, mib};

const READ_BUF: usize = 8 << 20;
const PROGRESS_REPORT_INTERVAL_SECS: u64 = 3;

pub fn pack(
    input: Option<&Path>,
    output: &Path,
    workers: u32,
    min_frame_size: usize,
    level: i32,
    strategy: Strategy,
    chunk_size: usize,
) -> Result<()> {
    anyhow::ensure!(chunk_size > 0, "chunk size must be positive");

    let reader: Box<dyn Read> = match input {
        Some(p) if p != Path::new("-") => Box::new(BufReader::with_capacity(
            READ_BUF,
            File::open(p).with_context(|| format!("open {}", p.display()))?,
        )),
        _ => Box::new(io::stdin().lock()),
    };

    let config = WriterConfig::new(workers, min_frame_size)
        .with_level(level)
        .with_strategy(strategy);
    info!(
        "pack out={} level={} strategy={} workers={} min_frame_size={}",
        output.display(),
        level,
        strategy,
        workers,
        min_frame_size
    );

    let writer = ArchiveWriter::open(output, config)
        .with_context(|| format!("open archive {}", output.display()))?;

    let start = Instant::now();
    let bytes_in = copy_chunks(reader, &writer, chunk_size, start)?;

    let summary = writer
        .close()
        .with_context(|| format!("close archive {}", output.display()))?;
    debug_assert_eq!(summary.uncompressed_bytes, bytes_in);

    let elapsed = start.elapsed().as_secs_f64();
    let total = summary.compressed_bytes + summary.seek_table_bytes;
    info!(
        "Complete: frames={} in={:.1} MiB out={:.1} MiB ratio={:.3} | {:.1} MiB/s | elapsed={}",
        summary.frames,
        mib(summary.uncompressed_bytes),
        mib(total),
        if summary.uncompressed_bytes > 0 {
            total as f64 / summary.uncompressed_bytes as f64
        } else {
            0.0
        },
        mib(summary.uncompressed_bytes) / elapsed.max(1e-9),
        format_duration(elapsed)
    );
    Ok(())
}

/// Reads `chunk_size` bytes at a time (short only at EOF) and hands each chunk to one `write`.
fn copy_chunks<R: Read>(
    mut reader: R,
    writer: &ArchiveWriter,
    chunk_size: usize,
    start: Instant,
) -> Result<u64> {
    let mut buf = vec![0u8; chunk_size];
    let mut total = 0u64;
    let report_interval = Duration::from_secs(PROGRESS_REPORT_INTERVAL_SECS);
    let mut last_report = Instant::now();

    loop {
        let n = read_full(&mut reader, &mut buf).context("read input")?;
        if n == 0 {
            return Ok(total);
        }
        writer.write(&buf[..n]).context("write archive")?;
        total += n as u64;

        if last_report.elapsed() >= report_interval {
            let elapsed = start.elapsed().as_secs_f64();
            info!(
                "in={:.1} MiB ({:.1} MiB/s) | elapsed={}",
                mib(total),
                mib(total) / elapsed.max(1e-9),
                format_duration(elapsed)
            );
            last_report = Instant::now();
        }
    }
}

fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
