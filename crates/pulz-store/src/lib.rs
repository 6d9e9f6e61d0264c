//! Transactional tabular store for signals, proposals, artifacts, executions,
//! missions and telemetry. Backed by SQLite in WAL mode with a single writer
//! connection serialising all mutations; reads use a small pool of read-only
//! connections so they never block on, or observe, a torn write.

mod connection;
pub mod artifacts;
pub mod executions;
pub mod missions;
pub mod proposals;
pub mod signals;
pub mod telemetry;

pub use connection::{Store, StoreError};
