//! # PLCSync Core
//!
//! Device-side model of the PLCSync gateway.
//!
//! This crate provides:
//! - Remote device records (`plc_parameters`, `new`, `current`)
//! - Memory blocks with field templates and change detection
//! - Version snapshots (new → baseline, current → baseline)
//! - Device sessions with reconnect and size-probe discipline
//! - The device client abstraction plus an in-memory controller
//!
//! ## Version Lifecycle
//!
//! A device is provisioned from its `new` version: every block's size is
//! probed against the device, every block is written, and `new` becomes
//! the baseline. Later `current` versions must keep the baseline's shape
//! (same blocks, same sizes) before they are written and replace it.
//!
//! ## Key Invariants
//!
//! - A block whose declared size does not match the device is never written
//! - At most one of `new`/`current` exists at a time
//! - Change sets are keyed by the field's position in the remote list
//! - A link that dropped is re-established at most once per operation

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod block;
pub mod device;
mod error;
mod field;
mod record;
mod session;
mod snapshot;

pub use block::{ChangeSet, MemoryBlock};
pub use device::{ConnectionParams, DeviceClient, DeviceClientFactory, DEFAULT_PORT};
pub use error::{CoreError, CoreResult, DeviceError, DeviceResult, FaultKind};
pub use field::{offset_from_json, value_from_json, value_to_json, FieldDescriptor};
pub use record::{
    block_name, parse_block_name, BlockSpec, Datablocks, DeviceRecord, PlcParameters, VersionPayload,
    MAX_BLOCK_SIZE,
};
pub use session::{DeviceSession, PendingUpload, SessionState};
pub use snapshot::{VersionLabel, VersionSnapshot};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
