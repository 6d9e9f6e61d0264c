use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Queued,
    Ignore,
    NeedsClarification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    DocGenerator,
    Automation,
    MicroSaas,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Feasibility {
    Low,
    Med,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    DraftProposal,
    Ignore,
    NeedsClarification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    Legal,
    Medical,
    Financial,
}

impl RiskFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskFlag::Legal => "legal",
            RiskFlag::Medical => "medical",
            RiskFlag::Financial => "financial",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scoring {
    pub category: Category,
    pub feasibility: Feasibility,
    pub estimated_build_time_minutes: u32,
    pub suggested_price_range: String,
    #[serde(default)]
    pub risk_flags: Vec<RiskFlag>,
    pub recommended_next_action: RecommendedAction,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub source: String,
    pub url: String,
    pub title: String,
    pub body_excerpt: String,
    pub author: Option<String>,
    pub created_at: String,
    pub raw: Value,
    #[serde(default)]
    pub contact_hint: Option<String>,
    #[serde(default)]
    pub scored: Option<Scoring>,
    #[serde(default)]
    pub proposal_id: Option<String>,
    pub status: SignalStatus,
    pub inserted_at: String,
}
