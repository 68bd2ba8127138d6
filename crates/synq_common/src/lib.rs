//! Synq Common - activity sample store shared by the synq tools
//!
//! Devices report their foreground window periodically; this crate stores
//! those samples on one of two backends and aggregates them per label over
//! time windows.

pub mod aggregate;
pub mod config;
pub mod driver;
pub mod error;
pub mod relational;
pub mod remote;
pub mod store;
pub mod types;

pub use aggregate::{ActivityShare, ActivitySummary, ElapsedTime};
pub use config::{BackendKind, StoreConfig, SynqConfig};
pub use driver::BackendDriver;
pub use error::{StoreError, StoreResult};
pub use store::ActivityStore;
pub use types::*;
