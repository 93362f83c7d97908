//! Encode command implementation.

use super::{load_record, select_version};
use crate::error::CliResult;
use plcsync_core::{block_name, DeviceRecord, VersionSnapshot};
use std::path::Path;

const BYTES_PER_LINE: usize = 16;

/// Runs the encode command.
pub fn run(path: &Path, version: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_record(path)?;
    for (name, buffer) in encode(&loaded.record, version)? {
        println!("{name} ({} bytes)", buffer.len());
        for line in hex_lines(&buffer) {
            println!("  {line}");
        }
        println!();
    }
    Ok(())
}

/// Encodes every block of the selected version.
pub fn encode(record: &DeviceRecord, version: Option<&str>) -> CliResult<Vec<(String, Vec<u8>)>> {
    let (label, payload) = select_version(record, version)?;
    let snapshot = VersionSnapshot::from_payload(label, payload)?;
    Ok(snapshot
        .blocks()
        .iter()
        .map(|block| (block_name(block.number()), block.buffer().to_vec()))
        .collect())
}

/// Formats a buffer as offset-prefixed hex lines.
pub fn hex_lines(buffer: &[u8]) -> Vec<String> {
    buffer
        .chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(line, chunk)| {
            let bytes: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
            format!("{:04x}: {}", line * BYTES_PER_LINE, bytes.join(" "))
        })
        .collect()
}
