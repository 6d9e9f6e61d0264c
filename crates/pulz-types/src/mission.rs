use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityMode {
    ScanOnly,
    DraftOnly,
    AutoDraftQueue,
    ExecuteAfterApproval,
}

impl AuthorityMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scan_only" => Some(AuthorityMode::ScanOnly),
            "draft_only" => Some(AuthorityMode::DraftOnly),
            "auto_draft_queue" => Some(AuthorityMode::AutoDraftQueue),
            "execute_after_approval" => Some(AuthorityMode::ExecuteAfterApproval),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityMode::ScanOnly => "scan_only",
            AuthorityMode::DraftOnly => "draft_only",
            AuthorityMode::AutoDraftQueue => "auto_draft_queue",
            AuthorityMode::ExecuteAfterApproval => "execute_after_approval",
        }
    }
}

impl Default for AuthorityMode {
    fn default() -> Self {
        AuthorityMode::AutoDraftQueue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionRunStatus {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionConfig {
    pub sources: Vec<String>,
    pub rate_per_source_per_minute: f64,
    pub max_items: u32,
    pub authority_mode: AuthorityMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub started_at: String,
    pub ends_at: String,
    pub status: MissionRunStatus,
    pub config: MissionConfig,
    pub authority_mode: AuthorityMode,
}

/// Process-wide live counters for the currently (or most recently) running mission.
/// Mutated only by the mission loop and the stop handler; see `spec` §9.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissionState {
    #[serde(default)]
    pub mission: Option<Mission>,
    pub items_processed: u64,
    pub model_calls: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_scan: Option<String>,
    pub token_usage: u64,
    pub execution_blocked: bool,
}

/// Request body for `POST /mission/start`.
#[derive(Debug, Clone, Deserialize)]
pub struct MissionStartRequest {
    #[serde(default)]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub duration_hours: Option<f64>,
    pub sources: Vec<String>,
    #[serde(default = "default_rate")]
    pub rate_per_source_per_minute: f64,
    #[serde(default = "default_max_items")]
    pub max_items: u32,
    #[serde(default)]
    pub authority_mode: Option<String>,
}

fn default_rate() -> f64 {
    2.0
}

fn default_max_items() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub state: MissionState,
    pub items_per_min: f64,
}
