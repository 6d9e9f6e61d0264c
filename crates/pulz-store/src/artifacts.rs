use pulz_types::{Artifact, ArtifactKind};
use rusqlite::{params, OptionalExtension, Row};

use crate::connection::{Store, StoreError};

impl Store {
    pub async fn insert_artifact(&self, artifact: Artifact) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "INSERT INTO artifacts
                    (id, proposal_id, execution_id, created_at, kind, path, sha256, data, text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    artifact.id,
                    artifact.proposal_id,
                    artifact.execution_id,
                    artifact.created_at,
                    kind_str(artifact.kind),
                    artifact.path,
                    artifact.sha256,
                    artifact.data.as_ref().map(serde_json::to_string).transpose()?,
                    artifact.text,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_artifact(&self, id: String) -> Result<Option<Artifact>, StoreError> {
        self.read(move |conn| {
            conn.query_row("SELECT * FROM artifacts WHERE id = ?1", params![id], row_to_artifact)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    pub async fn list_recent_artifacts(&self, limit: u32) -> Result<Vec<Artifact>, StoreError> {
        self.read(move |conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM artifacts ORDER BY created_at DESC LIMIT ?1")?;
            let rows = stmt
                .query_map(params![limit], row_to_artifact)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn list_artifacts_for_execution(
        &self,
        execution_id: String,
    ) -> Result<Vec<Artifact>, StoreError> {
        self.read(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM artifacts WHERE execution_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map(params![execution_id], row_to_artifact)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

fn row_to_artifact(row: &Row<'_>) -> rusqlite::Result<Artifact> {
    let kind: String = row.get("kind")?;
    let data: Option<String> = row.get("data")?;
    Ok(Artifact {
        id: row.get("id")?,
        proposal_id: row.get("proposal_id")?,
        execution_id: row.get("execution_id")?,
        created_at: row.get("created_at")?,
        kind: parse_kind(&kind),
        path: row.get("path")?,
        sha256: row.get("sha256")?,
        data: data
            .map(|d| serde_json::from_str(&d))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
        text: row.get("text")?,
    })
}

fn kind_str(kind: ArtifactKind) -> &'static str {
    kind.as_str()
}

fn parse_kind(value: &str) -> ArtifactKind {
    match value {
        "html" => ArtifactKind::Html,
        "pdf" => ArtifactKind::Pdf,
        "doc" => ArtifactKind::Doc,
        "zip" => ArtifactKind::Zip,
        _ => ArtifactKind::Json,
    }
}
