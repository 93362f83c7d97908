//! # PLCSync Codec
//!
//! Typed field encoding/decoding for PLC data block buffers.
//!
//! A data block is a fixed-size, numbered region of controller memory. The
//! gateway describes it as a list of typed fields at byte (or `byte.bit`)
//! offsets; this crate turns those fields into the raw buffer written to the
//! device and reads them back out of buffers read from the device.
//!
//! ## Layout Rules
//!
//! - `Bool`: one bit, addressed as `byte.bit` with bit 0–7
//! - `String`: 256-byte region; capacity byte (254), length byte, content
//! - `Int`: 16-bit signed, big-endian
//! - `Real`: 32-bit IEEE-754, big-endian
//!
//! All multi-byte values use the controller's big-endian byte order.
//!
//! ## Usage
//!
//! ```
//! use plcsync_codec::{decode_field, encode_block, DataType, FieldOffset, FieldValue};
//!
//! let speed = FieldValue::Int(1200);
//! let buffer = encode_block(4, [(FieldOffset::byte(2), &speed)]).unwrap();
//!
//! let decoded = decode_field(&buffer, FieldOffset::byte(2), DataType::Int).unwrap();
//! assert_eq!(decoded, speed);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{decode_field, BlockDecoder};
pub use encoder::{encode_block, encode_field, fits, BlockEncoder};
pub use error::{CodecError, CodecResult};
pub use value::{DataType, FieldOffset, FieldValue, STRING_CAPACITY, STRING_REGION};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn offset_strategy(width: usize, size: usize) -> impl Strategy<Value = FieldOffset> {
        (0..=size - width).prop_map(FieldOffset::byte)
    }

    proptest! {
        #[test]
        fn int_roundtrip(n in any::<i16>(), offset in offset_strategy(2, 64)) {
            let value = FieldValue::Int(n);
            let buffer = encode_block(64, [(offset, &value)]).unwrap();
            prop_assert_eq!(decode_field(&buffer, offset, DataType::Int).unwrap(), value);
        }

        #[test]
        fn real_roundtrip(r in any::<f32>(), offset in offset_strategy(4, 64)) {
            let value = FieldValue::Real(r);
            let buffer = encode_block(64, [(offset, &value)]).unwrap();
            prop_assert_eq!(decode_field(&buffer, offset, DataType::Real).unwrap(), value);
        }

        #[test]
        fn bool_roundtrip(flag in any::<bool>(), byte in 0usize..16, bit in 0u8..8) {
            let offset = FieldOffset::new(byte, bit).unwrap();
            let value = FieldValue::Bool(flag);
            let buffer = encode_block(16, [(offset, &value)]).unwrap();
            prop_assert_eq!(decode_field(&buffer, offset, DataType::Bool).unwrap(), value);
        }

        #[test]
        fn text_roundtrip(text in "[ -~]{0,254}") {
            let value = FieldValue::Text(text);
            let buffer = encode_block(STRING_REGION, [(FieldOffset::byte(0), &value)]).unwrap();
            prop_assert_eq!(
                decode_field(&buffer, FieldOffset::byte(0), DataType::String).unwrap(),
                value
            );
        }

        #[test]
        fn bool_leaves_neighbour_bits(initial in any::<u8>(), bit in 0u8..8, flag in any::<bool>()) {
            let mut encoder = BlockEncoder::from_bytes(vec![initial]);
            encoder.put(FieldOffset::new(0, bit).unwrap(), &FieldValue::Bool(flag)).unwrap();
            let mask = 1u8 << bit;
            prop_assert_eq!(encoder.as_bytes()[0] & !mask, initial & !mask);
        }
    }

    #[test]
    fn mixed_block_roundtrip() {
        let fields = vec![
            (FieldOffset::new(0, 1).unwrap(), FieldValue::Bool(true)),
            (FieldOffset::byte(2), FieldValue::Int(-12)),
            (FieldOffset::byte(4), FieldValue::Real(3.5)),
            (FieldOffset::byte(8), FieldValue::Text("pump".into())),
        ];
        let size = 8 + STRING_REGION;
        let buffer = encode_block(size, fields.iter().map(|(o, v)| (*o, v))).unwrap();
        assert_eq!(buffer.len(), size);

        let decoder = BlockDecoder::new(&buffer);
        for (offset, value) in &fields {
            assert_eq!(&decoder.get(*offset, value.data_type()).unwrap(), value);
        }
    }
}
