use anyhow::Result;
use clap::{Parser, Subcommand};
use nio_archive::{config::DEFAULT_LEVEL, config::DEFAULT_MIN_FRAME_SIZE, Strategy};
use std::path::PathBuf;
use tracing::Level;

mod commands;

use commands::{inspect::inspect_archive, pack::pack};

#[derive(Parser)]
#[command(name = "nioarc")]
#[command(about = "Seekable zstd archive writer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a byte stream into a seekable archive
    Pack {
        /// Input file (defaults to stdin, also "-")
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output archive path
        #[arg(short, long)]
        output: PathBuf,

        /// Compressor worker threads (0 = single-threaded)
        #[arg(long, default_value_t = 0)]
        workers: u32,

        /// Minimum uncompressed bytes per frame
        #[arg(long, default_value_t = DEFAULT_MIN_FRAME_SIZE)]
        min_frame_size: usize,

        /// zstd compression level
        #[arg(long, default_value_t = DEFAULT_LEVEL, allow_hyphen_values = true)]
        level: i32,

        /// zstd strategy (fast, dfast, greedy, lazy, lazy2, btlazy2, btopt, btultra, btultra2)
        #[arg(long, default_value_t = Strategy::Fast)]
        strategy: Strategy,

        /// Bytes handed to each write call
        #[arg(long, default_value_t = 128 << 10)]
        chunk_size: usize,
    },

    /// Print the seek table of an archive
    Inspect {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// List every frame
        #[arg(long, default_value_t = false)]
        frames: bool,

        /// Decompress every frame and check its size against the table
        #[arg(long, default_value_t = false)]
        verify: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Pack {
            input,
            output,
            workers,
            min_frame_size,
            level,
            strategy,
            chunk_size,
        } => pack(
            input.as_deref(),
            &output,
            workers,
            min_frame_size,
            level,
            strategy,
            chunk_size,
        ),
        Commands::Inspect {
            archive,
            frames,
            verify,
        } => inspect_archive(&archive, frames, verify),
    }
}
