pub mod config;
pub mod ids;
pub mod time;

pub use config::EngineConfig;
pub use ids::{artifact_id, hash_id, mission_id, proposal_id, telemetry_id};
pub use time::{now_iso, to_iso, truncate_to_hour};
