//! # esorm Testkit
//!
//! Test utilities for esorm.
//!
//! This crate provides:
//! - [`MemoryBackend`], an in-memory emulation of the document store that
//!   the gateway can talk to
//! - [`ScriptedTransport`], which replays canned responses and failures
//! - [`RecordingSink`], a bulk sink that records batched-writer flushes
//! - Fixture models and ORM helpers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use esorm_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_orm() {
//!     with_test_orm(|orm| {
//!         let mut device = Device::new("d1", "gateway", "p1");
//!         orm.insert(&mut device).unwrap();
//!         assert_eq!(orm.backend.calls("create"), 1);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod memory;
pub mod scripted;
pub mod sink;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::memory::*;
    pub use crate::scripted::*;
    pub use crate::sink::*;
}

pub use fixtures::*;
pub use generators::*;
pub use memory::*;
pub use scripted::*;
pub use sink::*;
