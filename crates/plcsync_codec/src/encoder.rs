//! Field encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::{DataType, FieldOffset, FieldValue, STRING_CAPACITY, STRING_REGION};

/// Encode a set of fields into a fresh zero-filled buffer of `size` bytes.
///
/// Fields are written in the order given; callers that need a
/// deterministic result for overlapping fields should sort them first.
///
/// # Errors
///
/// Returns an error if any field is malformed or does not fit the buffer.
pub fn encode_block<'a, I>(size: usize, fields: I) -> CodecResult<Vec<u8>>
where
    I: IntoIterator<Item = (FieldOffset, &'a FieldValue)>,
{
    let mut encoder = BlockEncoder::new(size);
    for (offset, value) in fields {
        encoder.put(offset, value)?;
    }
    Ok(encoder.into_bytes())
}

/// Write a single value into `buffer` at `offset`.
///
/// Only the bytes (or the bit) belonging to the field are touched.
///
/// # Errors
///
/// Returns [`CodecError::BufferOverrun`] if the field does not fit and
/// [`CodecError::InvalidOffset`] if a non-Bool value is given a bit index.
pub fn encode_field(buffer: &mut [u8], offset: FieldOffset, value: &FieldValue) -> CodecResult<()> {
    let data_type = value.data_type();
    offset.check_for(data_type)?;
    check_bounds(buffer.len(), offset.byte, data_type.width())?;

    let at = offset.byte;
    match value {
        FieldValue::Bool(flag) => {
            let mask = 1u8 << offset.bit;
            if *flag {
                buffer[at] |= mask;
            } else {
                buffer[at] &= !mask;
            }
        }
        FieldValue::Text(text) => encode_text(&mut buffer[at..at + STRING_REGION], text),
        FieldValue::Int(n) => buffer[at..at + 2].copy_from_slice(&n.to_be_bytes()),
        FieldValue::Real(r) => buffer[at..at + 4].copy_from_slice(&r.to_be_bytes()),
    }
    Ok(())
}

/// Builds one data block buffer.
pub struct BlockEncoder {
    buffer: Vec<u8>,
}

impl BlockEncoder {
    /// Create an encoder over a zero-filled buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            buffer: vec![0u8; size],
        }
    }

    /// Start from an existing buffer.
    pub fn from_bytes(buffer: Vec<u8>) -> Self {
        Self { buffer }
    }

    /// Write a value.
    pub fn put(&mut self, offset: FieldOffset, value: &FieldValue) -> CodecResult<()> {
        encode_field(&mut self.buffer, offset, value)
    }

    /// Consume this encoder and return the buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

pub(crate) fn check_bounds(len: usize, offset: usize, width: usize) -> CodecResult<()> {
    match offset.checked_add(width) {
        Some(end) if end <= len => Ok(()),
        _ => Err(CodecError::BufferOverrun { offset, width, len }),
    }
}

// Layout: [capacity, length, content.., zero padding].
fn encode_text(region: &mut [u8], text: &str) {
    let mut end = text.len().min(STRING_CAPACITY);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let content = &text.as_bytes()[..end];

    #[allow(clippy::cast_possible_truncation)]
    {
        region[0] = STRING_CAPACITY as u8;
        region[1] = content.len() as u8;
    }
    region[2..2 + content.len()].copy_from_slice(content);
    region[2 + content.len()..].fill(0);
}

/// Width check without a value, used when probing templates.
pub fn fits(len: usize, offset: FieldOffset, data_type: DataType) -> bool {
    check_bounds(len, offset.byte, data_type.width()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_bool_sets_single_bit() {
        let mut buffer = vec![0u8; 2];
        encode_field(&mut buffer, FieldOffset::new(1, 0).unwrap(), &FieldValue::Bool(true)).unwrap();
        encode_field(&mut buffer, FieldOffset::new(1, 7).unwrap(), &FieldValue::Bool(true)).unwrap();
        assert_eq!(buffer, vec![0x00, 0x81]);

        encode_field(&mut buffer, FieldOffset::new(1, 0).unwrap(), &FieldValue::Bool(false)).unwrap();
        assert_eq!(buffer, vec![0x00, 0x80]);
    }

    #[test]
    fn encode_int_big_endian() {
        let mut buffer = vec![0u8; 4];
        encode_field(&mut buffer, FieldOffset::byte(2), &FieldValue::Int(0x1234)).unwrap();
        assert_eq!(buffer, vec![0x00, 0x00, 0x12, 0x34]);

        encode_field(&mut buffer, FieldOffset::byte(0), &FieldValue::Int(-1)).unwrap();
        assert_eq!(&buffer[..2], &[0xff, 0xff]);
    }

    #[test]
    fn encode_real_big_endian() {
        let mut buffer = vec![0u8; 4];
        encode_field(&mut buffer, FieldOffset::byte(0), &FieldValue::Real(1.0)).unwrap();
        assert_eq!(buffer, vec![0x3f, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn encode_string_layout() {
        let mut buffer = vec![0xaa; STRING_REGION];
        encode_field(&mut buffer, FieldOffset::byte(0), &FieldValue::Text("abc".into())).unwrap();
        assert_eq!(buffer[0], 254);
        assert_eq!(buffer[1], 3);
        assert_eq!(&buffer[2..5], b"abc");
        assert!(buffer[5..].iter().all(|b| *b == 0));
    }

    #[test]
    fn encode_string_truncates_on_char_boundary() {
        let mut buffer = vec![0u8; STRING_REGION];
        // 253 ASCII bytes followed by a two-byte character straddling the limit.
        let text = format!("{}é", "a".repeat(253));
        encode_field(&mut buffer, FieldOffset::byte(0), &FieldValue::Text(text)).unwrap();
        assert_eq!(buffer[1], 253);
    }

    #[test]
    fn encode_overrun_rejected() {
        let mut buffer = vec![0u8; 3];
        let err = encode_field(&mut buffer, FieldOffset::byte(2), &FieldValue::Int(1)).unwrap_err();
        assert_eq!(
            err,
            CodecError::BufferOverrun {
                offset: 2,
                width: 2,
                len: 3
            }
        );

        let mut buffer = vec![0u8; 100];
        assert!(encode_field(&mut buffer, FieldOffset::byte(0), &FieldValue::Text("x".into())).is_err());
    }

    #[test]
    fn encode_rejects_bit_on_int() {
        let mut buffer = vec![0u8; 4];
        let result = encode_field(&mut buffer, FieldOffset::new(0, 2).unwrap(), &FieldValue::Int(1));
        assert!(matches!(result, Err(CodecError::InvalidOffset { .. })));
    }

    #[test]
    fn encode_block_zero_fills() {
        let value = FieldValue::Int(7);
        let bytes = encode_block(6, [(FieldOffset::byte(4), &value)]).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn fits_checks_width() {
        assert!(fits(4, FieldOffset::byte(0), DataType::Real));
        assert!(!fits(4, FieldOffset::byte(1), DataType::Real));
        assert!(!fits(usize::MAX, FieldOffset::byte(usize::MAX), DataType::Int));
    }
}
