//! Append-only telemetry event recorder and `/telemetry/summary` aggregates
//! (`spec.md` §4.8). Process-wide logging itself is `tracing`/`tracing-subscriber`,
//! initialized by the `engine` binary; this crate only records and aggregates
//! the domain-level events that feed the summary endpoint.

pub mod recorder;
pub mod summary;

pub use recorder::{record_event, record_tokens_used};
pub use summary::{telemetry_summary, RoiEntry, TelemetrySummary, TokenBucket};
