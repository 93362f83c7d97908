//! Remote device records.
//!
//! A record is the JSON object stored under a device id:
//!
//! ```json
//! {
//!   "plc_name": "press-1",
//!   "plc_parameters": {"Ip_Address": "10.0.0.5", "Rack": 0, "Slot": 1},
//!   "new": {"plc_informations": {}, "datablocks": {"data_block_names": ["DB1"],
//!           "DB1": {"size": 4, "data": [{"Offset": 0, "Data_type": "Int", "Value": 3}]}}},
//!   "changer_id": "operator"
//! }
//! ```

use crate::device::{ConnectionParams, DEFAULT_PORT};
use crate::error::{CoreError, CoreResult};
use crate::field::FieldDescriptor;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Controller network parameters as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlcParameters {
    /// IP address.
    #[serde(rename = "Ip_Address")]
    pub ip_address: String,
    /// Rack number.
    #[serde(rename = "Rack", deserialize_with = "lenient_u16")]
    pub rack: u16,
    /// Slot number.
    #[serde(rename = "Slot", deserialize_with = "lenient_u16")]
    pub slot: u16,
    /// TCP port.
    #[serde(rename = "Port", default = "default_port", deserialize_with = "lenient_u16")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl From<&PlcParameters> for ConnectionParams {
    fn from(params: &PlcParameters) -> Self {
        ConnectionParams::new(params.ip_address.clone(), params.rack, params.slot)
            .with_port(params.port)
    }
}

// Operators type numbers into a web form; accept "1" as well as 1.
fn lenient_u16<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    lenient_uint(&raw)
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| de::Error::custom(format!("expected a small unsigned integer, got {raw}")))
}

fn lenient_uint(raw: &Value) -> Option<u64> {
    match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// The `datablocks` section of a version payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datablocks {
    /// Names of the declared blocks (`DB1`, `DB7`, ...).
    #[serde(default)]
    pub data_block_names: Vec<String>,
    /// Block bodies keyed by name.
    #[serde(flatten)]
    pub blocks: BTreeMap<String, Value>,
}

/// One `new` or `current` version as stored remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionPayload {
    /// Opaque device metadata.
    #[serde(default)]
    pub plc_informations: Map<String, Value>,
    /// Declared data blocks.
    #[serde(default)]
    pub datablocks: Datablocks,
}

impl VersionPayload {
    /// Parses a version payload.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        Self::deserialize(value).map_err(|e| CoreError::invalid_record(e.to_string()))
    }

    /// Parses every declared block, in declaration order.
    pub fn block_specs(&self) -> CoreResult<Vec<BlockSpec>> {
        self.datablocks
            .data_block_names
            .iter()
            .map(|name| {
                let body = self
                    .datablocks
                    .blocks
                    .get(name)
                    .ok_or_else(|| CoreError::invalid_block(name, "declared but missing"))?;
                BlockSpec::from_json(name, body)
            })
            .collect()
    }
}

/// Largest data block a controller can hold, in bytes.
pub const MAX_BLOCK_SIZE: usize = 65_535;

/// Declaration of one data block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSpec {
    /// Block number (the `n` of `DBn`).
    pub number: u16,
    /// Declared size in bytes.
    pub size: usize,
    /// Field template.
    pub fields: Vec<FieldDescriptor>,
}

impl BlockSpec {
    /// Creates a block declaration.
    pub fn new(number: u16, size: usize, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            number,
            size,
            fields,
        }
    }

    /// Parses a `{size, data}` body declared under `name`.
    pub fn from_json(name: &str, body: &Value) -> CoreResult<Self> {
        let number = parse_block_name(name)?;

        let size = body
            .get("size")
            .and_then(lenient_uint)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| CoreError::invalid_block(name, "missing or invalid size"))?;
        if size == 0 {
            return Err(CoreError::invalid_block(name, "size must be positive"));
        }
        if size > MAX_BLOCK_SIZE {
            return Err(CoreError::invalid_block(
                name,
                format!("size {size} exceeds {MAX_BLOCK_SIZE} bytes"),
            ));
        }

        let fields = match body.get("data") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| !entry.is_null())
                .map(|(index, entry)| FieldDescriptor::from_json(index, entry))
                .collect::<CoreResult<_>>()?,
            // Sparse lists come back from the store as index-keyed objects.
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(key, entry)| {
                    let index = key.parse::<usize>().map_err(|_| {
                        CoreError::invalid_block(name, format!("field key {key:?} is not an index"))
                    })?;
                    FieldDescriptor::from_json(index, entry)
                })
                .collect::<CoreResult<_>>()?,
            Some(_) => return Err(CoreError::invalid_block(name, "data must be a list")),
        };

        Ok(Self::new(number, size, fields))
    }
}

/// Parses `DBn` into `n`.
pub fn parse_block_name(name: &str) -> CoreResult<u16> {
    let digits = name
        .strip_prefix("DB")
        .ok_or_else(|| CoreError::invalid_block(name, "name must look like DB<n>"))?;
    match digits.parse::<u16>() {
        Ok(0) => Err(CoreError::invalid_block(name, "block number must be positive")),
        Ok(number) => Ok(number),
        Err(_) => Err(CoreError::invalid_block(name, "block number is not a number")),
    }
}

/// Formats `n` as `DBn`.
pub fn block_name(number: u16) -> String {
    format!("DB{number}")
}

/// A whole device record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Display name.
    #[serde(default)]
    pub plc_name: String,
    /// Connection parameters.
    pub plc_parameters: PlcParameters,
    /// Version waiting to be provisioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<VersionPayload>,
    /// Version in effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<VersionPayload>,
    /// Author of the last write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changer_id: Option<String>,
}

impl DeviceRecord {
    /// Parses a record.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        if !value.is_object() {
            return Err(CoreError::invalid_record("record is not an object"));
        }
        Self::deserialize(value).map_err(|e| CoreError::invalid_record(e.to_string()))
    }

    /// Connection parameters for the device client.
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams::from(&self.plc_parameters)
    }
}
