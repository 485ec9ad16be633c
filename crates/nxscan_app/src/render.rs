//! Plain-text report: one block per transaction, one indented list per volume.

use humansize::{format_size, BINARY};
use nxscan_core::ondisk::Record;
use nxscan_core::{Entry, WalkReport};
use std::io::{self, Write};

pub fn text(report: &WalkReport, image_size: u64, out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "Image:      {} ({})",
        report.label,
        format_size(image_size, BINARY)
    )?;
    writeln!(out, "Container:  {}", hex::encode(report.container_uuid))?;
    writeln!(out, "Block size: {}", report.block_size)?;
    writeln!(
        out,
        "Checkpoints: {} merged, {}",
        report.checkpoints.len(),
        report.stop
    )?;
    writeln!(out, "{}", "-".repeat(60))?;

    // Newest transaction first, like the checkpoint list.
    for (xid, volumes) in report.entries.entries().iter().rev() {
        writeln!(out, "xid {xid}")?;
        for (volume, entries) in volumes {
            writeln!(out, "  {volume} ({} records)", entries.len())?;
            for entry in entries {
                writeln!(out, "    {}", line(entry))?;
            }
        }
    }

    writeln!(out, "{}", "-".repeat(60))?;
    writeln!(out, "Total records: {}", report.entry_count())?;
    Ok(())
}

fn line(entry: &Entry) -> String {
    let name = entry.name.as_deref().unwrap_or("-");
    match &entry.record {
        Record::DirRecord {
            file_id, file_kind, ..
        } => format!("{:<8} {name} -> {file_id}", file_kind.name()),
        Record::Inode { mode, .. } => {
            format!("{:<8} {} (mode {mode:o})", "inode", entry.object_id)
        }
        Record::Raw { value } => {
            let kind = format!("type{}", entry.record_type.raw());
            format!("{kind:<8} {} {name} ({} bytes)", entry.object_id, value.len())
        }
    }
}
