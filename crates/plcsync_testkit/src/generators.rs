//! Property-based test generators using proptest.
//!
//! Provides strategies for generating field values and block layouts
//! whose fields never overlap.

use crate::fixtures::field;
use plcsync_codec::{DataType, FieldOffset, FieldValue, STRING_CAPACITY};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for generating data types.
pub fn data_type_strategy() -> impl Strategy<Value = DataType> {
    prop_oneof![
        Just(DataType::Bool),
        Just(DataType::String),
        Just(DataType::Int),
        Just(DataType::Real),
    ]
}

/// Strategy for generating values of one data type.
///
/// Reals are finite; strings are ASCII and fit the string capacity.
pub fn field_value_strategy(data_type: DataType) -> BoxedStrategy<FieldValue> {
    match data_type {
        DataType::Bool => any::<bool>().prop_map(FieldValue::Bool).boxed(),
        DataType::String => prop::string::string_regex(&format!("[ -~]{{0,{STRING_CAPACITY}}}"))
            .expect("Invalid regex")
            .prop_map(FieldValue::Text)
            .boxed(),
        DataType::Int => any::<i16>().prop_map(FieldValue::Int).boxed(),
        DataType::Real => (-1.0e6f32..1.0e6f32).prop_map(FieldValue::Real).boxed(),
    }
}

/// Strategy for generating values of any data type.
pub fn any_field_value_strategy() -> impl Strategy<Value = FieldValue> {
    data_type_strategy().prop_flat_map(field_value_strategy)
}

/// Strategy for generating offsets valid for `data_type` in a block of
/// `size` bytes. `size` must be at least the type's width.
pub fn field_offset_strategy(data_type: DataType, size: usize) -> BoxedStrategy<FieldOffset> {
    let last = size.saturating_sub(data_type.width());
    if data_type == DataType::Bool {
        (0..=last, 0u8..8)
            .prop_map(|(byte, bit)| FieldOffset { byte, bit })
            .boxed()
    } else {
        (0..=last).prop_map(FieldOffset::byte).boxed()
    }
}

/// Strategy for generating a block layout: a size and fields laid out
/// back to back (with optional gaps) so that none overlap.
pub fn block_layout_strategy() -> impl Strategy<Value = (usize, Vec<(FieldOffset, FieldValue)>)> {
    prop::collection::vec((any_field_value_strategy(), 0usize..4, 0u8..8), 1..8).prop_map(|entries| {
        let mut cursor = 0;
        let mut fields = Vec::with_capacity(entries.len());
        for (value, gap, bit) in entries {
            cursor += gap;
            let offset = match value {
                FieldValue::Bool(_) => FieldOffset { byte: cursor, bit },
                _ => FieldOffset::byte(cursor),
            };
            cursor += value.data_type().width();
            fields.push((offset, value));
        }
        (cursor, fields)
    })
}

/// Strategy for generating a block as remote JSON: a size and the
/// `data` list of field entries.
pub fn block_json_strategy() -> impl Strategy<Value = (usize, Vec<Value>)> {
    block_layout_strategy().prop_map(|(size, fields)| {
        let data = fields
            .into_iter()
            .map(|(offset, value)| {
                let offset = if offset.bit == 0 {
                    Value::from(offset.byte)
                } else {
                    Value::String(offset.to_string())
                };
                let data_type = value.data_type();
                field(offset, data_type.name(), plcsync_core::value_to_json(&value))
            })
            .collect();
        (size, data)
    })
}
