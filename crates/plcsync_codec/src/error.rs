//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding a field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The field names a data type the codec does not know.
    #[error("unsupported field type: {type_name}")]
    UnsupportedFieldType {
        /// The type name as declared by the remote payload.
        type_name: String,
    },

    /// The field does not fit inside the buffer.
    #[error("buffer overrun: {width} bytes at offset {offset} exceed buffer of {len} bytes")]
    BufferOverrun {
        /// Byte offset of the field.
        offset: usize,
        /// Bytes the field occupies.
        width: usize,
        /// Length of the buffer.
        len: usize,
    },

    /// The offset is malformed for its data type.
    #[error("invalid offset {offset}: {reason}")]
    InvalidOffset {
        /// The offset as given.
        offset: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The value cannot be represented by the field's data type.
    #[error("value {value} is out of range for {data_type}")]
    ValueOutOfRange {
        /// Name of the target data type.
        data_type: String,
        /// The rejected value, rendered as text.
        value: String,
    },

    /// The value has the wrong shape for the field's data type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Name of the declared data type.
        expected: String,
        /// Description of what was found instead.
        found: String,
    },
}

impl CodecError {
    /// Create an unsupported field type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedFieldType {
            type_name: type_name.into(),
        }
    }

    /// Create an invalid offset error.
    pub fn invalid_offset(offset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOffset {
            offset: offset.into(),
            reason: reason.into(),
        }
    }

    /// Create an out-of-range error.
    pub fn out_of_range(data_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self::ValueOutOfRange {
            data_type: data_type.into(),
            value: value.into(),
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
