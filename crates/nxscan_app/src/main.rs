//! nxscan - APFS checkpoint entry recovery
//!
//! Lists the root directory records of every volume in an APFS container
//! image, for the current superblock and the older ones still present in
//! the checkpoint ring.

mod render;

use anyhow::{Context, Result};
use clap::Parser;
use nxscan_core::{BlockSource, CheckpointWalker, WalkOptions};
use nxscan_io::Reader;
use std::io::Write;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "nxscan")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Container image file or block device
    image: PathBuf,

    /// Name shown in the report (defaults to the image path)
    #[arg(short, long)]
    label: Option<String>,

    /// Only read the current container superblock
    #[arg(long, default_value_t = false)]
    no_history: bool,

    /// Stop after this many historical superblocks
    #[arg(long, value_name = "N")]
    max_checkpoints: Option<u32>,

    /// Accept blocks with a bad Fletcher-64 checksum
    #[arg(long, default_value_t = false)]
    no_verify: bool,

    /// Read encrypted volumes instead of skipping them
    #[arg(long, default_value_t = false)]
    include_encrypted: bool,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    #[arg(short, long, default_value_t = false, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long, default_value_t = false)]
    quiet: bool,

    /// Use seek and read instead of a memory map
    #[arg(long, default_value_t = false)]
    no_mmap: bool,
}

impl Args {
    fn walk_options(&self) -> WalkOptions {
        let mut options = WalkOptions::new();
        if self.no_history {
            options = options.current_only();
        }
        if let Some(limit) = self.max_checkpoints {
            options = options.with_max_checkpoints(limit);
        }
        if self.no_verify {
            options = options.without_checksums();
        }
        if self.include_encrypted {
            options = options.include_encrypted();
        }
        options
    }

    fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let opened = if args.no_mmap {
        Reader::disk(&args.image)
    } else {
        Reader::new(&args.image)
    };
    let reader =
        opened.with_context(|| format!("Failed to open image: {}", args.image.display()))?;

    let image_size = reader.size();
    let label = args
        .label
        .clone()
        .unwrap_or_else(|| args.image.display().to_string());

    let report = CheckpointWalker::new(reader, label, args.walk_options())
        .walk()
        .with_context(|| format!("Failed to read container: {}", args.image.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &report).context("Failed to write JSON report")?;
        writeln!(out)?;
    } else {
        render::text(&report, image_size, &mut out).context("Failed to write report")?;
    }

    Ok(())
}
