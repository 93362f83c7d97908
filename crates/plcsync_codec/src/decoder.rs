//! Field decoder.

use crate::encoder::check_bounds;
use crate::error::CodecResult;
use crate::value::{DataType, FieldOffset, FieldValue, STRING_CAPACITY, STRING_REGION};

/// Read a value of `data_type` from `buffer` at `offset`.
///
/// # Errors
///
/// Returns [`crate::CodecError::BufferOverrun`] if the field does not fit
/// and [`crate::CodecError::InvalidOffset`] if a non-Bool type is given a
/// bit index.
pub fn decode_field(buffer: &[u8], offset: FieldOffset, data_type: DataType) -> CodecResult<FieldValue> {
    offset.check_for(data_type)?;
    check_bounds(buffer.len(), offset.byte, data_type.width())?;

    let at = offset.byte;
    let value = match data_type {
        DataType::Bool => FieldValue::Bool(buffer[at] & (1u8 << offset.bit) != 0),
        DataType::String => FieldValue::Text(decode_text(&buffer[at..at + STRING_REGION])),
        DataType::Int => FieldValue::Int(i16::from_be_bytes([buffer[at], buffer[at + 1]])),
        DataType::Real => FieldValue::Real(f32::from_be_bytes([
            buffer[at],
            buffer[at + 1],
            buffer[at + 2],
            buffer[at + 3],
        ])),
    };
    Ok(value)
}

/// Reads typed fields out of one data block buffer.
pub struct BlockDecoder<'a> {
    data: &'a [u8],
}

impl<'a> BlockDecoder<'a> {
    /// Create a decoder for the given buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Read a value.
    pub fn get(&self, offset: FieldOffset, data_type: DataType) -> CodecResult<FieldValue> {
        decode_field(self.data, offset, data_type)
    }

    /// Length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn decode_text(region: &[u8]) -> String {
    // Length byte is clamped: device memory may hold anything.
    let len = usize::from(region[1]).min(STRING_CAPACITY);
    String::from_utf8_lossy(&region[2..2 + len]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_field;
    use crate::error::CodecError;

    fn roundtrip(size: usize, offset: FieldOffset, value: FieldValue) {
        let mut buffer = vec![0u8; size];
        encode_field(&mut buffer, offset, &value).unwrap();
        let decoded = decode_field(&buffer, offset, value.data_type()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn roundtrip_bool_edges() {
        roundtrip(1, FieldOffset::new(0, 0).unwrap(), FieldValue::Bool(true));
        roundtrip(1, FieldOffset::new(0, 7).unwrap(), FieldValue::Bool(true));
        roundtrip(1, FieldOffset::new(0, 7).unwrap(), FieldValue::Bool(false));
    }

    #[test]
    fn roundtrip_int_edges() {
        roundtrip(2, FieldOffset::byte(0), FieldValue::Int(i16::MIN));
        roundtrip(2, FieldOffset::byte(0), FieldValue::Int(i16::MAX));
        roundtrip(4, FieldOffset::byte(2), FieldValue::Int(0));
    }

    #[test]
    fn roundtrip_real_edges() {
        roundtrip(4, FieldOffset::byte(0), FieldValue::Real(0.0));
        roundtrip(4, FieldOffset::byte(0), FieldValue::Real(-273.15));
        roundtrip(8, FieldOffset::byte(4), FieldValue::Real(0.125));
    }

    #[test]
    fn roundtrip_string_edges() {
        roundtrip(STRING_REGION, FieldOffset::byte(0), FieldValue::Text(String::new()));
        roundtrip(
            STRING_REGION,
            FieldOffset::byte(0),
            FieldValue::Text("x".repeat(STRING_CAPACITY)),
        );
        roundtrip(STRING_REGION + 10, FieldOffset::byte(10), FieldValue::Text("Grüße".into()));
    }

    #[test]
    fn overlong_string_is_truncated() {
        let mut buffer = vec![0u8; STRING_REGION];
        let long = "y".repeat(STRING_CAPACITY + 20);
        encode_field(&mut buffer, FieldOffset::byte(0), &FieldValue::Text(long)).unwrap();
        let decoded = decode_field(&buffer, FieldOffset::byte(0), DataType::String).unwrap();
        assert_eq!(decoded, FieldValue::Text("y".repeat(STRING_CAPACITY)));
    }

    #[test]
    fn corrupt_length_byte_is_clamped() {
        let mut buffer = vec![b'z'; STRING_REGION];
        buffer[1] = 255;
        let decoded = decode_field(&buffer, FieldOffset::byte(0), DataType::String).unwrap();
        assert_eq!(decoded, FieldValue::Text("z".repeat(STRING_CAPACITY)));
    }

    #[test]
    fn decode_overrun_rejected() {
        let buffer = vec![0u8; 5];
        let result = decode_field(&buffer, FieldOffset::byte(2), DataType::Real);
        assert!(matches!(result, Err(CodecError::BufferOverrun { .. })));

        let result = decode_field(&buffer, FieldOffset::byte(5), DataType::Bool);
        assert!(matches!(result, Err(CodecError::BufferOverrun { .. })));
    }

    #[test]
    fn block_decoder_reads_fields() {
        let buffer = vec![0x01, 0x00, 0x2a];
        let decoder = BlockDecoder::new(&buffer);
        assert_eq!(decoder.len(), 3);
        assert_eq!(
            decoder.get(FieldOffset::new(0, 0).unwrap(), DataType::Bool).unwrap(),
            FieldValue::Bool(true)
        );
        assert_eq!(
            decoder.get(FieldOffset::byte(1), DataType::Int).unwrap(),
            FieldValue::Int(42)
        );
    }
}
