//! Field descriptors parsed from remote block templates.

use crate::error::{CoreError, CoreResult};
use plcsync_codec::{CodecError, CodecResult, DataType, FieldOffset, FieldValue};
use serde_json::Value;

/// One typed field of a data block template.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Position of the field in the remote `data` list.
    pub index: usize,
    /// Location inside the block.
    pub offset: FieldOffset,
    /// Desired value.
    pub value: FieldValue,
}

impl FieldDescriptor {
    /// Creates a descriptor, checking the offset against the value's type.
    pub fn new(index: usize, offset: FieldOffset, value: FieldValue) -> CoreResult<Self> {
        offset
            .check_for(value.data_type())
            .map_err(|e| invalid_field(index, e))?;
        Ok(Self {
            index,
            offset,
            value,
        })
    }

    /// Parses a `{Offset, Data_type, Value}` entry.
    pub fn from_json(index: usize, entry: &Value) -> CoreResult<Self> {
        let object = entry.as_object().ok_or_else(|| CoreError::InvalidFieldSpec {
            index,
            reason: "field entry is not an object".into(),
        })?;

        let type_name = object
            .get("Data_type")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::InvalidFieldSpec {
                index,
                reason: "missing Data_type".into(),
            })?;
        let data_type: DataType = type_name.parse()?;

        let offset = object
            .get("Offset")
            .ok_or_else(|| CoreError::InvalidFieldSpec {
                index,
                reason: "missing Offset".into(),
            })
            .and_then(|raw| offset_from_json(raw).map_err(|e| invalid_field(index, e)))?;

        let value = object
            .get("Value")
            .map_or(Ok(FieldValue::zero(data_type)), |raw| {
                value_from_json(data_type, raw)
            })
            .map_err(|e| invalid_field(index, e))?;

        Self::new(index, offset, value)
    }

    /// Data type of the field.
    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }
}

fn invalid_field(index: usize, error: CodecError) -> CoreError {
    match error {
        CodecError::UnsupportedFieldType { .. } => CoreError::Codec(error),
        other => CoreError::InvalidFieldSpec {
            index,
            reason: other.to_string(),
        },
    }
}

/// Reads an offset given either as a number (`2.3`) or a string (`"2.3"`).
pub fn offset_from_json(raw: &Value) -> CodecResult<FieldOffset> {
    match raw {
        Value::Number(n) => match n.as_u64() {
            Some(byte) => usize::try_from(byte)
                .map(FieldOffset::byte)
                .map_err(|_| CodecError::invalid_offset(n.to_string(), "byte index too large")),
            None => FieldOffset::from_f64(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(text) => FieldOffset::parse(text),
        other => Err(CodecError::invalid_offset(
            other.to_string(),
            "offset must be a number or string",
        )),
    }
}

/// Converts a JSON scalar into a value of `data_type`.
pub fn value_from_json(data_type: DataType, raw: &Value) -> CodecResult<FieldValue> {
    let mismatch = || CodecError::type_mismatch(data_type.name(), raw.to_string());
    match data_type {
        DataType::Bool => match raw {
            Value::Bool(flag) => Ok(FieldValue::Bool(*flag)),
            Value::Number(n) => match n.as_u64() {
                Some(0) => Ok(FieldValue::Bool(false)),
                Some(1) => Ok(FieldValue::Bool(true)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        DataType::String => raw
            .as_str()
            .map(|text| FieldValue::Text(text.to_string()))
            .ok_or_else(mismatch),
        DataType::Int => {
            let n = raw.as_i64().ok_or_else(mismatch)?;
            i16::try_from(n)
                .map(FieldValue::Int)
                .map_err(|_| CodecError::out_of_range(data_type.name(), n.to_string()))
        }
        DataType::Real => {
            let r = raw.as_f64().ok_or_else(mismatch)?;
            #[allow(clippy::cast_possible_truncation)]
            let narrowed = r as f32;
            if r.is_finite() && !narrowed.is_finite() {
                return Err(CodecError::out_of_range(data_type.name(), r.to_string()));
            }
            Ok(FieldValue::Real(narrowed))
        }
    }
}

/// Converts a value to the JSON scalar stored remotely.
pub fn value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Bool(flag) => Value::Bool(*flag),
        FieldValue::Text(text) => Value::String(text.clone()),
        FieldValue::Int(n) => Value::from(*n),
        FieldValue::Real(r) => serde_json::Number::from_f64(f64::from(*r))
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}
