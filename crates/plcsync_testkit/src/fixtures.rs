//! Device record fixtures.
//!
//! Builds the JSON records operators store remotely, so tests do not have
//! to spell out the nested `datablocks` layout by hand.

use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Builds one `{Offset, Data_type, Value}` field entry.
pub fn field(offset: impl Into<Value>, data_type: &str, value: impl Into<Value>) -> Value {
    json!({
        "Offset": offset.into(),
        "Data_type": data_type,
        "Value": value.into(),
    })
}

/// Builds device records.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    name: String,
    address: String,
    rack: u16,
    slot: u16,
    port: Option<u16>,
    changer_id: Option<String>,
    informations: Map<String, Value>,
    blocks: Vec<(u16, usize, Vec<Value>)>,
}

impl RecordBuilder {
    /// Starts a record for a controller at `address`.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            rack: 0,
            slot: 1,
            port: None,
            changer_id: Some("operator".to_string()),
            informations: Map::new(),
            blocks: Vec::new(),
        }
    }

    /// Sets rack and slot.
    pub fn rack_slot(mut self, rack: u16, slot: u16) -> Self {
        self.rack = rack;
        self.slot = slot;
        self
    }

    /// Sets an explicit port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the author marker; `None` leaves it out.
    pub fn changer_id(mut self, changer_id: Option<&str>) -> Self {
        self.changer_id = changer_id.map(str::to_string);
        self
    }

    /// Adds a metadata entry to `plc_informations`.
    pub fn info(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.informations.insert(key.to_string(), value.into());
        self
    }

    /// Declares a data block.
    pub fn block(mut self, number: u16, size: usize, fields: Vec<Value>) -> Self {
        self.blocks.push((number, size, fields));
        self
    }

    /// Declared blocks as `(number, size)`.
    pub fn block_sizes(&self) -> Vec<(u16, usize)> {
        self.blocks.iter().map(|(n, size, _)| (*n, *size)).collect()
    }

    /// Builds the version payload (`plc_informations` and `datablocks`).
    pub fn version(&self) -> Value {
        let mut datablocks = Map::new();
        let names: Vec<Value> = self
            .blocks
            .iter()
            .map(|(n, _, _)| Value::String(format!("DB{n}")))
            .collect();
        datablocks.insert("data_block_names".into(), Value::Array(names));
        for (number, size, fields) in &self.blocks {
            datablocks.insert(
                format!("DB{number}"),
                json!({"size": size, "data": fields}),
            );
        }
        json!({
            "plc_informations": self.informations,
            "datablocks": datablocks,
        })
    }

    fn header(&self) -> Map<String, Value> {
        let mut params = json!({
            "Ip_Address": self.address,
            "Rack": self.rack,
            "Slot": self.slot,
        });
        if let Some(port) = self.port {
            params["Port"] = json!(port);
        }

        let mut record = Map::new();
        record.insert("plc_name".into(), Value::String(self.name.clone()));
        record.insert("plc_parameters".into(), params);
        if let Some(changer_id) = &self.changer_id {
            record.insert("changer_id".into(), Value::String(changer_id.clone()));
        }
        record
    }

    /// Builds a record carrying the blocks as its `new` version.
    pub fn build(&self) -> Value {
        let mut record = self.header();
        record.insert("new".into(), self.version());
        Value::Object(record)
    }

    /// Builds a record carrying the blocks as its `current` version.
    pub fn build_current(&self) -> Value {
        let mut record = self.header();
        record.insert("current".into(), self.version());
        record.insert("permission".into(), json!({"to_write": true}));
        Value::Object(record)
    }
}

/// A press covering every field type.
///
/// DB1 (8 bytes) holds a Bool at 0.1, an Int at 2 and a Real at 4.
/// DB2 (256 bytes) holds a String.
pub fn sample_record() -> Value {
    sample_builder().build()
}

/// Builder behind [`sample_record`].
pub fn sample_builder() -> RecordBuilder {
    RecordBuilder::new("press-1", "10.0.0.5")
        .info("model", "S7-1200")
        .block(
            1,
            8,
            vec![
                field(0.1, "Bool", true),
                field(2, "Int", -12),
                field(4, "Real", 1.5),
            ],
        )
        .block(2, 256, vec![field(0, "String", "hello")])
}

/// A device record written to a temporary JSON file.
pub struct TempRecordFile {
    file: NamedTempFile,
}

impl TempRecordFile {
    /// Writes `record` to a fresh temporary file.
    pub fn new(record: &Value) -> std::io::Result<Self> {
        let mut file = NamedTempFile::new()?;
        serde_json::to_writer_pretty(&mut file, record)?;
        file.flush()?;
        Ok(Self { file })
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
