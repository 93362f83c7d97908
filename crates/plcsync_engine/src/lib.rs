//! # PLCSync Engine
//!
//! Synchronization orchestrator for the PLCSync gateway.
//!
//! This crate provides:
//! - Remote store abstraction with gateway-level helpers
//! - An in-memory remote store with realtime-database semantics
//! - Classification of remote push events
//! - The orchestrator: device registry, listener and poll threads
//!
//! ## Architecture
//!
//! Two independent sources of change act on the same devices:
//! 1. Remote push events (operator edits) are classified and turned into
//!    device provisioning, updates or removals
//! 2. A periodic poll reads device memory and uploads observed changes
//!
//! Every gateway write carries a provenance marker (`changer_id`). Events
//! whose marker equals the gateway's own are echoes and are ignored.
//!
//! ## Key Invariants
//!
//! - Self-authored events never mutate sessions
//! - A failing device is removed and its remote entry deleted; other
//!   devices are unaffected
//! - Uploads for a session replaced or removed mid-poll are dropped

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod error;
mod event;
mod orchestrator;
pub mod remote;

pub use config::{GatewayConfig, DEFAULT_MARKER};
pub use error::{EngineError, EngineResult};
pub use event::{classify, path_segments, EventAction, EventType, Provenance, RemoteEvent};
pub use orchestrator::{DeviceStatus, GatewayStats, Orchestrator, PollReport};
pub use remote::memory::{MemoryRemoteStore, StoreWrite};
pub use remote::{device_path, field_value_path, operator_update, RemoteStore, RemoteStoreExt};
