use anyhow::{Context, Result};
use memmap2::Mmap;
use std::{fs::File, path::Path};
use tracing::info;

use nio_archive::SeekTable;

use super::mib;

pub fn inspect_archive(path: &Path, list_frames: bool, verify: bool) -> Result<()> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    // read-only mapping; the archive is not expected to change underneath us
    let data = unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", path.display()))?;

    let table = SeekTable::from_archive_tail(&data)
        .with_context(|| format!("decode seek table of {}", path.display()))?;

    println!("archive:       {}", path.display());
    println!("frames:        {}", table.len());
    println!(
        "uncompressed:  {} ({:.1} MiB)",
        table.uncompressed_size(),
        mib(table.uncompressed_size())
    );
    println!(
        "compressed:    {} ({:.1} MiB)",
        table.compressed_size(),
        mib(table.compressed_size())
    );
    println!("seek table:    {} bytes", table.encoded_len());

    let trailing = data.len() as u64 - table.compressed_size() - table.encoded_len() as u64;
    if trailing != 0 {
        println!("unindexed:     {} bytes before the seek table", trailing);
    }

    if list_frames {
        println!(
            "{:>8} {:>14} {:>10} {:>14} {:>10}",
            "frame", "c_offset", "c_size", "u_offset", "u_size"
        );
        for (i, f) in table.frames().iter().enumerate() {
            println!(
                "{:>8} {:>14} {:>10} {:>14} {:>10}",
                i,
                table.compressed_offset(i).unwrap_or_default(),
                f.compressed_size,
                table.uncompressed_offset(i).unwrap_or_default(),
                f.uncompressed_size
            );
        }
    }

    if verify {
        for i in 0..table.len() {
            let Some(range) = table.compressed_range(i) else {
                continue;
            };
            let plain = zstd::decode_all(&data[range])
                .with_context(|| format!("decompress frame {i}"))?;
            let expected = table.frames()[i].uncompressed_size as usize;
            anyhow::ensure!(
                plain.len() == expected,
                "frame {} decompressed to {} bytes, seek table says {}",
                i,
                plain.len(),
                expected
            );
        }
        info!("verified {} frames", table.len());
    }

    Ok(())
}
