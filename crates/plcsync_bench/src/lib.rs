//! Benchmark utilities.

use plcsync_codec::{FieldOffset, FieldValue};
use plcsync_core::{FieldDescriptor, MemoryBlock};

/// Builds `count` fields cycling through every data type, laid out back
/// to back. Returns the block size and the fields.
pub fn mixed_fields(count: usize) -> (usize, Vec<FieldDescriptor>) {
    let mut cursor = 0;
    let mut fields = Vec::with_capacity(count);
    for index in 0..count {
        let (offset, value) = match index % 4 {
            0 => (
                FieldOffset { byte: cursor, bit: (index % 8) as u8 },
                FieldValue::Bool(index % 3 == 0),
            ),
            1 => (FieldOffset::byte(cursor), FieldValue::Int(index as i16)),
            2 => (FieldOffset::byte(cursor), FieldValue::Real(index as f32 * 0.5)),
            _ => (FieldOffset::byte(cursor), FieldValue::Text(format!("field-{index}"))),
        };
        cursor += value.data_type().width();
        if let Ok(field) = FieldDescriptor::new(index, offset, value) {
            fields.push(field);
        }
    }
    (cursor, fields)
}

/// Builds `count` Int fields.
pub fn int_fields(count: usize) -> (usize, Vec<FieldDescriptor>) {
    let fields = (0..count)
        .filter_map(|i| FieldDescriptor::new(i, FieldOffset::byte(i * 2), FieldValue::Int(i as i16)).ok())
        .collect();
    (count * 2, fields)
}

/// Builds a block from generated fields.
pub fn block(size: usize, fields: Vec<FieldDescriptor>) -> Option<MemoryBlock> {
    MemoryBlock::build(1, size, fields).ok()
}

/// Returns a copy of `buffer` with every `stride`-th byte flipped.
pub fn mutate(buffer: &[u8], stride: usize) -> Vec<u8> {
    buffer
        .iter()
        .enumerate()
        .map(|(i, b)| if stride > 0 && i % stride == 0 { !b } else { *b })
        .collect()
}
