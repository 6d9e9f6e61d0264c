use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Queued,
    Approved,
    Executing,
    Executed,
    Cancelled,
    Failed,
}

impl ProposalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProposalStatus::Executed | ProposalStatus::Cancelled | ProposalStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Manual,
    AutoAfterApproval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMethod {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalData {
    pub problem_summary: String,
    pub solution_options: Vec<String>,
    pub suggested_price_range: String,
    pub estimated_build_time_minutes: u32,
    pub message_template: String,
    pub contact_method: ContactMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub signal_id: String,
    pub status: ProposalStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub approved_at: Option<String>,
    #[serde(default)]
    pub executing_at: Option<String>,
    #[serde(default)]
    pub executed_at: Option<String>,
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub mission_id: Option<String>,
    #[serde(default)]
    pub estimated_revenue_cents: Option<i64>,
    #[serde(default)]
    pub realized_revenue_cents: Option<i64>,
    pub data: ProposalData,
}
