use std::collections::HashMap;

use pulz_types::{ExecutionMode, Proposal, ProposalData, ProposalStatus};
use rusqlite::{params, OptionalExtension, Row};

use crate::connection::{Store, StoreError};

impl Store {
    pub async fn insert_proposal(&self, proposal: Proposal) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "INSERT INTO proposals
                    (id, signal_id, status, created_at, updated_at, approved_at,
                     executing_at, executed_at, execution_mode, mission_id,
                     estimated_revenue_cents, realized_revenue_cents, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    proposal.id,
                    proposal.signal_id,
                    status_str(proposal.status),
                    proposal.created_at,
                    proposal.updated_at,
                    proposal.approved_at,
                    proposal.executing_at,
                    proposal.executed_at,
                    mode_str(proposal.execution_mode),
                    proposal.mission_id,
                    proposal.estimated_revenue_cents,
                    proposal.realized_revenue_cents,
                    serde_json::to_string(&proposal.data)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_proposal(&self, id: String) -> Result<Option<Proposal>, StoreError> {
        self.read(move |conn| {
            conn.query_row("SELECT * FROM proposals WHERE id = ?1", params![id], |row| {
                row_to_proposal(row)
            })
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    pub async fn list_queue(&self) -> Result<Vec<Proposal>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM proposals WHERE status = 'queued' ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], row_to_proposal)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn list_proposals_by_status(
        &self,
        statuses: Vec<String>,
    ) -> Result<Vec<Proposal>, StoreError> {
        self.read(move |conn| {
            if statuses.is_empty() {
                let mut stmt = conn.prepare("SELECT * FROM proposals ORDER BY created_at DESC")?;
                let rows = stmt
                    .query_map([], row_to_proposal)?
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(rows);
            }
            let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "SELECT * FROM proposals WHERE status IN ({placeholders}) ORDER BY created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> =
                statuses.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
            let rows = stmt
                .query_map(params.as_slice(), row_to_proposal)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn update_proposal_status(
        &self,
        id: String,
        status: ProposalStatus,
        timestamp_column: Option<&'static str>,
        now: String,
    ) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE proposals SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status_str(status), now.clone(), id.clone()],
            )?;
            if let Some(column) = timestamp_column {
                conn.execute(
                    &format!("UPDATE proposals SET {column} = ?1 WHERE id = ?2"),
                    params![now, id],
                )?;
            }
            Ok(())
        })
        .await
    }

    pub async fn set_realized_revenue(
        &self,
        id: String,
        realized_revenue_cents: i64,
        now: String,
    ) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE proposals SET realized_revenue_cents = ?1, updated_at = ?2 WHERE id = ?3",
                params![realized_revenue_cents, now, id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn count_proposals(&self) -> Result<u64, StoreError> {
        self.read(|conn| {
            let n: i64 = conn.query_row("SELECT count(*) FROM proposals", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }

    /// Sum of `realized_revenue_cents` grouped by the originating signal's
    /// `source`, for the `/telemetry/summary.roi_by_source` aggregate (`spec`
    /// §4.8). Proposals with no realized revenue are excluded from the sum,
    /// not counted as zero.
    pub async fn realized_revenue_by_signal_source(
        &self,
    ) -> Result<HashMap<String, i64>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.source, SUM(p.realized_revenue_cents)
                 FROM proposals p JOIN signals s ON p.signal_id = s.id
                 WHERE p.realized_revenue_cents IS NOT NULL
                 GROUP BY s.source",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let source: String = row.get(0)?;
                    let total: i64 = row.get(1)?;
                    Ok((source, total))
                })?
                .collect::<Result<HashMap<_, _>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

fn row_to_proposal(row: &Row<'_>) -> rusqlite::Result<Proposal> {
    let status: String = row.get("status")?;
    let mode: String = row.get("execution_mode")?;
    let data: String = row.get("data")?;
    Ok(Proposal {
        id: row.get("id")?,
        signal_id: row.get("signal_id")?,
        status: parse_status(&status),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        approved_at: row.get("approved_at")?,
        executing_at: row.get("executing_at")?,
        executed_at: row.get("executed_at")?,
        execution_mode: parse_mode(&mode),
        mission_id: row.get("mission_id")?,
        estimated_revenue_cents: row.get("estimated_revenue_cents")?,
        realized_revenue_cents: row.get("realized_revenue_cents")?,
        data: serde_json::from_str::<ProposalData>(&data)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
    })
}

fn status_str(status: ProposalStatus) -> &'static str {
    match status {
        ProposalStatus::Draft => "draft",
        ProposalStatus::Queued => "queued",
        ProposalStatus::Approved => "approved",
        ProposalStatus::Executing => "executing",
        ProposalStatus::Executed => "executed",
        ProposalStatus::Cancelled => "cancelled",
        ProposalStatus::Failed => "failed",
    }
}

fn parse_status(value: &str) -> ProposalStatus {
    match value {
        "draft" => ProposalStatus::Draft,
        "queued" => ProposalStatus::Queued,
        "approved" => ProposalStatus::Approved,
        "executing" => ProposalStatus::Executing,
        "executed" => ProposalStatus::Executed,
        "cancelled" => ProposalStatus::Cancelled,
        _ => ProposalStatus::Failed,
    }
}

fn mode_str(mode: ExecutionMode) -> &'static str {
    match mode {
        ExecutionMode::Manual => "manual",
        ExecutionMode::AutoAfterApproval => "auto_after_approval",
    }
}

fn parse_mode(value: &str) -> ExecutionMode {
    match value {
        "auto_after_approval" => ExecutionMode::AutoAfterApproval,
        _ => ExecutionMode::Manual,
    }
}
