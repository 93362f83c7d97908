//! # PLCSync Testkit
//!
//! Test utilities for PLCSync.
//!
//! This crate provides:
//! - JSON device record builders and temp-file fixtures
//! - A simulated plant: controllers sized from records, an in-memory store
//!   and a gateway wired to both
//! - Property-based test generators using proptest
//! - Polling helpers for threaded tests
//!
//! ## Usage
//!
//! ```rust
//! use plcsync_testkit::prelude::*;
//!
//! let record = RecordBuilder::new("press", "10.0.0.5")
//!     .block(1, 4, vec![field(0, "Int", 12)])
//!     .build();
//! let plant = TestPlant::with_devices(&[("dev1", record)]);
//! plant.bootstrap();
//! assert!(plant.gateway.is_registered("dev1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod plant;
pub mod wait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::plant::*;
    pub use crate::wait::*;
}

pub use fixtures::*;
pub use generators::*;
pub use plant::*;
pub use wait::*;
