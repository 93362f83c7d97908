//! Error types for PLCSync core.

use plcsync_codec::CodecError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type for device client operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Broad classification of a failure, used by the orchestrator to decide
/// how to clean up after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Device unreachable or connection parameters rejected.
    ConnectionFault,
    /// Declared block size, count or identity does not match.
    ShapeFault,
    /// Unsupported field type or buffer bounds violation.
    CodecFault,
    /// Malformed or ambiguous remote data.
    ProtocolFault,
    /// Device rejected a write.
    RemoteWriteFault,
    /// The remote store itself failed.
    RemoteStoreFault,
}

/// Errors reported by a device memory client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The device refused the connection.
    #[error("connection to {address} refused: {reason}")]
    ConnectionRefused {
        /// Address that was dialled.
        address: String,
        /// Why the connection failed.
        reason: String,
    },

    /// The client is not connected.
    #[error("client is not connected")]
    NotConnected,

    /// The block does not exist on the device.
    #[error("data block DB{block} does not exist")]
    UnknownBlock {
        /// Block number.
        block: u16,
    },

    /// A read or write reached past the addressable region.
    #[error("access to DB{block} at {start}+{len} exceeds its {size} bytes")]
    OutOfRange {
        /// Block number.
        block: u16,
        /// Start offset.
        start: usize,
        /// Requested length.
        len: usize,
        /// Addressable size of the block.
        size: usize,
    },

    /// The device rejected a write for another reason.
    #[error("write to DB{block} rejected: {reason}")]
    WriteRejected {
        /// Block number.
        block: u16,
        /// Reason given by the device.
        reason: String,
    },
}

impl DeviceError {
    /// Returns true if the error means the link itself is down.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DeviceError::ConnectionRefused { .. } | DeviceError::NotConnected
        )
    }
}

/// Errors that can occur in PLCSync core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Field codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A field in a block template is malformed.
    #[error("invalid field #{index}: {reason}")]
    InvalidFieldSpec {
        /// Position of the field in the declared list.
        index: usize,
        /// Description of the problem.
        reason: String,
    },

    /// A block declaration is malformed.
    #[error("invalid data block {name}: {reason}")]
    InvalidBlock {
        /// Block name as declared.
        name: String,
        /// Description of the problem.
        reason: String,
    },

    /// A buffer does not have the block's declared size.
    #[error("DB{block} buffer is {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Block number.
        block: u16,
        /// Declared size.
        expected: usize,
        /// Size of the buffer received.
        actual: usize,
    },

    /// A snapshot was built without blocks.
    #[error("snapshot has no data blocks")]
    EmptySnapshot,

    /// A snapshot declares the same block twice.
    #[error("data block DB{block} declared twice")]
    DuplicateBlock {
        /// Block number.
        block: u16,
    },

    /// The declared block size does not match the device.
    #[error("DB{block} declared with {declared} bytes: {reason}")]
    DatablockSize {
        /// Block number.
        block: u16,
        /// Declared size.
        declared: usize,
        /// Which probe failed.
        reason: String,
    },

    /// The device could not be reached.
    #[error("device {device_id} unreachable: {reason}")]
    PlcConnection {
        /// Device identity.
        device_id: String,
        /// Description of the failure.
        reason: String,
    },

    /// The record carries no `new` version.
    #[error("device {device_id} has no new version")]
    NewMissing {
        /// Device identity.
        device_id: String,
    },

    /// The record carries no `current` version.
    #[error("device {device_id} has no current version")]
    CurrentMissing {
        /// Device identity.
        device_id: String,
    },

    /// The `current` version does not have the baseline's shape.
    #[error("current version does not match baseline: {reason}")]
    CurrentMismatch {
        /// Description of the first mismatch.
        reason: String,
    },

    /// No baseline exists yet.
    #[error("device {device_id} has no baseline")]
    OldDataMissing {
        /// Device identity.
        device_id: String,
    },

    /// Writing a block to the device failed.
    #[error("writing DB{block} failed: {source}")]
    Write {
        /// Block number.
        block: u16,
        /// Device error.
        #[source]
        source: DeviceError,
    },

    /// Reading a block from the device failed.
    #[error("reading DB{block} failed: {source}")]
    Read {
        /// Block number.
        block: u16,
        /// Device error.
        #[source]
        source: DeviceError,
    },

    /// The remote device record is malformed.
    #[error("invalid device record: {reason}")]
    InvalidRecord {
        /// Description of the problem.
        reason: String,
    },

    /// The session has been closed.
    #[error("session is closed")]
    SessionClosed,
}

impl CoreError {
    /// Create an invalid record error.
    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }

    /// Create an invalid block error.
    pub fn invalid_block(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBlock {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns the fault class of this error.
    pub fn kind(&self) -> FaultKind {
        match self {
            CoreError::PlcConnection { .. } | CoreError::Read { .. } | CoreError::SessionClosed => {
                FaultKind::ConnectionFault
            }
            CoreError::InvalidBlock { .. }
            | CoreError::SizeMismatch { .. }
            | CoreError::EmptySnapshot
            | CoreError::DuplicateBlock { .. }
            | CoreError::DatablockSize { .. }
            | CoreError::CurrentMismatch { .. } => FaultKind::ShapeFault,
            CoreError::Codec(_) | CoreError::InvalidFieldSpec { .. } => FaultKind::CodecFault,
            CoreError::NewMissing { .. }
            | CoreError::CurrentMissing { .. }
            | CoreError::OldDataMissing { .. }
            | CoreError::InvalidRecord { .. } => FaultKind::ProtocolFault,
            CoreError::Write { .. } => FaultKind::RemoteWriteFault,
        }
    }

    /// Returns true if the device could not be reached.
    pub fn is_connection_fault(&self) -> bool {
        self.kind() == FaultKind::ConnectionFault
    }
}
