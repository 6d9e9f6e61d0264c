use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifact::ArtifactKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Html,
    Pdf,
    Doc,
    Site,
}

impl Lane {
    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Html => "html",
            Lane::Pdf => "pdf",
            Lane::Doc => "doc",
            Lane::Site => "site",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "html" => Some(Lane::Html),
            "pdf" => Some(Lane::Pdf),
            "doc" => Some(Lane::Doc),
            "site" => Some(Lane::Site),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub proposal_id: String,
    #[serde(default)]
    pub mission_id: Option<String>,
    pub lane: Lane,
    pub status: ExecutionStatus,
    pub started_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub approved_by: Option<String>,
    pub inputs: Value,
    #[serde(default)]
    pub outputs: Value,
    #[serde(default)]
    pub logs_text: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metrics: ExecutionMetrics,
}

/// Planning result returned by `Executor::plan` before `run` is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub estimated_tokens: u32,
    pub estimated_seconds: f64,
}

/// What an executor lane produced after a successful `run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorOutcome {
    pub outputs: Value,
    pub artifacts: Vec<ExecutorArtifact>,
    pub metrics: ExecutionMetrics,
}

/// A single file an executor lane produced, pending hashing and a store row.
/// `bytes` is always the exact file content written to disk; `text` is an
/// optional human-readable mirror stored alongside the artifact row for
/// lanes whose output is itself text (`html`, `doc`'s markdown member).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorArtifact {
    pub filename: String,
    pub kind: ArtifactKind,
    #[serde(with = "serde_bytes_as_base64")]
    pub bytes: Vec<u8>,
    pub text: Option<String>,
}

mod serde_bytes_as_base64 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .encode(bytes)
            .serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        use base64::Engine;
        let encoded = String::deserialize(de)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
