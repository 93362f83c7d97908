//! Field types, offsets and values.

use crate::error::{CodecError, CodecResult};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Bytes occupied by a String field (capacity byte, length byte, content).
pub const STRING_REGION: usize = 256;

/// Maximum content bytes of a String field.
pub const STRING_CAPACITY: usize = STRING_REGION - 2;

/// Data type of a field inside a data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// A single bit addressed as `byte.bit`.
    Bool,
    /// A fixed 256-byte string region.
    String,
    /// 16-bit signed integer.
    Int,
    /// 32-bit IEEE-754 float.
    Real,
}

impl DataType {
    /// Returns the name used by remote payloads.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "Bool",
            DataType::String => "String",
            DataType::Int => "Int",
            DataType::Real => "Real",
        }
    }

    /// Returns the number of bytes the field touches.
    pub fn width(&self) -> usize {
        match self {
            DataType::Bool => 1,
            DataType::String => STRING_REGION,
            DataType::Int => 2,
            DataType::Real => 4,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = CodecError;

    fn from_str(s: &str) -> CodecResult<Self> {
        match s {
            "Bool" => Ok(DataType::Bool),
            "String" => Ok(DataType::String),
            "Int" => Ok(DataType::Int),
            "Real" => Ok(DataType::Real),
            other => Err(CodecError::unsupported_type(other)),
        }
    }
}

/// Position of a field inside a buffer.
///
/// Booleans use both parts (`byte.bit`); every other type lives at a whole
/// byte and must have `bit == 0`. Ordering is by byte, then bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldOffset {
    /// Byte index.
    pub byte: usize,
    /// Bit index within the byte (0–7).
    pub bit: u8,
}

impl FieldOffset {
    /// Creates an offset, rejecting bit indices above 7.
    pub fn new(byte: usize, bit: u8) -> CodecResult<Self> {
        if bit > 7 {
            return Err(CodecError::invalid_offset(
                format!("{byte}.{bit}"),
                "bit index must be 0-7",
            ));
        }
        Ok(Self { byte, bit })
    }

    /// Creates a whole-byte offset.
    pub fn byte(byte: usize) -> Self {
        Self { byte, bit: 0 }
    }

    /// Parses a `byte` or `byte.bit` offset.
    ///
    /// The fractional part is read as a decimal number, so `"3.10"` and
    /// `"3.1"` both address bit 1 of byte 3.
    pub fn parse(text: &str) -> CodecResult<Self> {
        let text = text.trim();
        let (byte_part, bit_part) = match text.split_once('.') {
            Some((byte, bit)) => (byte, bit.trim_end_matches('0')),
            None => (text, ""),
        };

        let byte = byte_part
            .parse::<usize>()
            .map_err(|_| CodecError::invalid_offset(text, "byte index is not a number"))?;

        let bit = if bit_part.is_empty() {
            0
        } else {
            bit_part
                .parse::<u8>()
                .map_err(|_| CodecError::invalid_offset(text, "bit index is not a number"))?
        };

        Self::new(byte, bit).map_err(|_| CodecError::invalid_offset(text, "bit index must be 0-7"))
    }

    /// Converts a numeric offset such as `2.3`.
    pub fn from_f64(value: f64) -> CodecResult<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(CodecError::invalid_offset(
                value.to_string(),
                "offset must be a non-negative number",
            ));
        }
        Self::parse(&value.to_string())
    }

    /// Checks that the offset is valid for `data_type`.
    pub fn check_for(&self, data_type: DataType) -> CodecResult<()> {
        if data_type != DataType::Bool && self.bit != 0 {
            return Err(CodecError::invalid_offset(
                self.to_string(),
                format!("{data_type} fields must start on a whole byte"),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for FieldOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.byte, self.bit)
    }
}

/// A decoded field value.
///
/// Serializes as the bare JSON scalar the remote store holds.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Bool value.
    Bool(bool),
    /// String content.
    Text(String),
    /// Int value.
    Int(i16),
    /// Real value.
    Real(f32),
}

impl FieldValue {
    /// Returns the data type that stores this value.
    pub fn data_type(&self) -> DataType {
        match self {
            FieldValue::Bool(_) => DataType::Bool,
            FieldValue::Text(_) => DataType::String,
            FieldValue::Int(_) => DataType::Int,
            FieldValue::Real(_) => DataType::Real,
        }
    }

    /// Returns the zero value of a data type.
    pub fn zero(data_type: DataType) -> Self {
        match data_type {
            DataType::Bool => FieldValue::Bool(false),
            DataType::String => FieldValue::Text(String::new()),
            DataType::Int => FieldValue::Int(0),
            DataType::Real => FieldValue::Real(0.0),
        }
    }
}

// Reals compare by bit pattern so a NaN equals itself.
impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Text(a), FieldValue::Text(b)) => a == b,
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            (FieldValue::Real(a), FieldValue::Real(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Text(s) => write!(f, "{s:?}"),
            FieldValue::Int(n) => write!(f, "{n}"),
            FieldValue::Real(r) => write!(f, "{r}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_names_roundtrip() {
        for data_type in [DataType::Bool, DataType::String, DataType::Int, DataType::Real] {
            assert_eq!(data_type.name().parse::<DataType>().unwrap(), data_type);
        }
    }

    #[test]
    fn unknown_data_type_rejected() {
        let err = "DWord".parse::<DataType>().unwrap_err();
        assert_eq!(err, CodecError::unsupported_type("DWord"));
        assert!("bool".parse::<DataType>().is_err());
    }

    #[test]
    fn parse_offsets() {
        assert_eq!(FieldOffset::parse("4").unwrap(), FieldOffset::byte(4));
        assert_eq!(FieldOffset::parse("0.7").unwrap(), FieldOffset::new(0, 7).unwrap());
        assert_eq!(FieldOffset::parse("3.10").unwrap(), FieldOffset::new(3, 1).unwrap());
        assert_eq!(FieldOffset::parse("12.0").unwrap(), FieldOffset::byte(12));
    }

    #[test]
    fn parse_rejects_bad_offsets() {
        assert!(FieldOffset::parse("1.8").is_err());
        assert!(FieldOffset::parse("-1").is_err());
        assert!(FieldOffset::parse("abc").is_err());
        assert!(FieldOffset::parse("2.x").is_err());
    }

    #[test]
    fn offsets_from_numbers() {
        assert_eq!(FieldOffset::from_f64(2.3).unwrap(), FieldOffset::new(2, 3).unwrap());
        assert_eq!(FieldOffset::from_f64(8.0).unwrap(), FieldOffset::byte(8));
        assert!(FieldOffset::from_f64(-1.0).is_err());
        assert!(FieldOffset::from_f64(f64::NAN).is_err());
    }

    #[test]
    fn offsets_sort_by_byte_then_bit() {
        let mut offsets = vec![
            FieldOffset::byte(4),
            FieldOffset::new(0, 3).unwrap(),
            FieldOffset::new(0, 1).unwrap(),
        ];
        offsets.sort();
        assert_eq!(offsets[0], FieldOffset::new(0, 1).unwrap());
        assert_eq!(offsets[2], FieldOffset::byte(4));
    }

    #[test]
    fn non_bool_fields_need_whole_bytes() {
        let offset = FieldOffset::new(2, 1).unwrap();
        assert!(offset.check_for(DataType::Bool).is_ok());
        assert!(offset.check_for(DataType::Int).is_err());
    }

    #[test]
    fn real_equality_uses_bits() {
        assert_eq!(FieldValue::Real(f32::NAN), FieldValue::Real(f32::NAN));
        assert_ne!(FieldValue::Real(0.0), FieldValue::Real(-0.0));
        assert_ne!(FieldValue::Int(1), FieldValue::Real(1.0));
    }

    #[test]
    fn values_serialize_as_scalars() {
        assert_eq!(serde_json::to_string(&FieldValue::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&FieldValue::Int(-3)).unwrap(), "-3");
        assert_eq!(serde_json::to_string(&FieldValue::Real(1.5)).unwrap(), "1.5");
        assert_eq!(
            serde_json::to_string(&FieldValue::Text("ok".into())).unwrap(),
            "\"ok\""
        );
    }
}
