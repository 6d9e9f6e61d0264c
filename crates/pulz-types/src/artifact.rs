use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Json,
    Html,
    Pdf,
    Doc,
    Zip,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Json => "json",
            ArtifactKind::Html => "html",
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Doc => "doc",
            ArtifactKind::Zip => "zip",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub proposal_id: String,
    #[serde(default)]
    pub execution_id: Option<String>,
    pub created_at: String,
    pub kind: ArtifactKind,
    pub path: String,
    pub sha256: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub text: Option<String>,
}
