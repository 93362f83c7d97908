//! Inspect command implementation.

use super::{load_record, select_version};
use crate::error::CliResult;
use plcsync_core::{block_name, value_to_json, DeviceRecord, VersionSnapshot};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Record inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Display name.
    pub plc_name: String,
    /// Controller address.
    pub address: String,
    /// Rack number.
    pub rack: u16,
    /// Slot number.
    pub slot: u16,
    /// TCP port.
    pub port: u16,
    /// Version shown (`new` or `current`).
    pub version: String,
    /// Author marker, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changer_id: Option<String>,
    /// Version metadata.
    pub plc_informations: Value,
    /// Blocks in block-number order.
    pub blocks: Vec<BlockReport>,
}

/// One data block.
#[derive(Debug, Serialize)]
pub struct BlockReport {
    /// Block name (`DB1`).
    pub name: String,
    /// Declared size in bytes.
    pub size: usize,
    /// Fields in offset order.
    pub fields: Vec<FieldReport>,
}

/// One field, decoded from the encoded block.
#[derive(Debug, Serialize)]
pub struct FieldReport {
    /// Position in the remote `data` list.
    pub index: usize,
    /// `byte.bit` offset.
    pub offset: String,
    /// Data type name.
    pub data_type: String,
    /// Value as it would be read back from the device.
    pub value: Value,
}

/// Runs the inspect command.
pub fn run(path: &Path, version: Option<&str>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_record(path)?;
    let result = inspect(&loaded.record, version)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Builds the inspection result for a parsed record.
pub fn inspect(record: &DeviceRecord, version: Option<&str>) -> CliResult<InspectResult> {
    let (label, payload) = select_version(record, version)?;
    let snapshot = VersionSnapshot::from_payload(label, payload)?;

    let mut blocks = Vec::with_capacity(snapshot.blocks().len());
    for block in snapshot.blocks() {
        let values = block.values()?;
        let fields = block
            .fields()
            .iter()
            .zip(values)
            .map(|(field, (_, value))| FieldReport {
                index: field.index,
                offset: field.offset.to_string(),
                data_type: field.data_type().name().to_string(),
                value: value_to_json(&value),
            })
            .collect();
        blocks.push(BlockReport {
            name: block_name(block.number()),
            size: block.size(),
            fields,
        });
    }

    let params = &record.plc_parameters;
    Ok(InspectResult {
        plc_name: record.plc_name.clone(),
        address: params.ip_address.clone(),
        rack: params.rack,
        slot: params.slot,
        port: params.port,
        version: label.to_string(),
        changer_id: record.changer_id.clone(),
        plc_informations: Value::Object(snapshot.metadata().clone()),
        blocks,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("PLCSync Record Inspection");
    println!("=========================");
    println!();
    println!("Device:   {}", result.plc_name);
    println!(
        "Address:  {} (rack {}, slot {}, port {})",
        result.address, result.rack, result.slot, result.port
    );
    println!("Version:  {}", result.version);
    if let Some(changer_id) = &result.changer_id {
        println!("Author:   {changer_id}");
    }
    println!();

    for block in &result.blocks {
        println!("{} ({} bytes, {} fields)", block.name, block.size, block.fields.len());
        println!("  {:>5}  {:>7}  {:<7} VALUE", "INDEX", "OFFSET", "TYPE");
        for field in &block.fields {
            println!(
                "  {:>5}  {:>7}  {:<7} {}",
                field.index, field.offset, field.data_type, field.value
            );
        }
        println!();
    }
}
