use pulz_types::{Execution, ExecutionMetrics, ExecutionStatus, Lane};
use rusqlite::{params, OptionalExtension, Row};

use crate::connection::{Store, StoreError};

impl Store {
    pub async fn insert_execution(&self, execution: Execution) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "INSERT INTO executions
                    (id, proposal_id, mission_id, lane, status, started_at, finished_at,
                     approved_by, inputs, outputs, logs_text, error, metrics)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    execution.id,
                    execution.proposal_id,
                    execution.mission_id,
                    execution.lane.as_str(),
                    execution.status.as_str(),
                    execution.started_at,
                    execution.finished_at,
                    execution.approved_by,
                    serde_json::to_string(&execution.inputs)?,
                    serde_json::to_string(&execution.outputs)?,
                    execution.logs_text,
                    execution.error,
                    serde_json::to_string(&execution.metrics)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_execution(&self, id: String) -> Result<Option<Execution>, StoreError> {
        self.read(move |conn| {
            conn.query_row("SELECT * FROM executions WHERE id = ?1", params![id], row_to_execution)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    /// True when `proposal_id` already has an execution in `{queued, running}`.
    pub async fn has_active_execution(&self, proposal_id: String) -> Result<bool, StoreError> {
        self.read(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT count(*) FROM executions WHERE proposal_id = ?1 AND status IN ('queued','running')",
                params![proposal_id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
        .await
    }

    pub async fn append_log_line(&self, id: String, line: String) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE executions SET logs_text = logs_text || ?1 WHERE id = ?2",
                params![format!("{line}\n"), id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn update_execution_status(
        &self,
        id: String,
        status: ExecutionStatus,
        finished_at: Option<String>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE executions SET status = ?1, finished_at = ?2, error = ?3 WHERE id = ?4",
                params![status.as_str(), finished_at, error, id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn update_execution_outputs(
        &self,
        id: String,
        outputs: serde_json::Value,
        metrics: ExecutionMetrics,
    ) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE executions SET outputs = ?1, metrics = ?2 WHERE id = ?3",
                params![serde_json::to_string(&outputs)?, serde_json::to_string(&metrics)?, id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_executions(
        &self,
        status: Option<String>,
        lane: Option<String>,
        mission_id: Option<String>,
    ) -> Result<Vec<Execution>, StoreError> {
        self.read(move |conn| {
            let mut sql = String::from("SELECT * FROM executions WHERE 1=1");
            let mut bound: Vec<String> = Vec::new();
            if let Some(status) = &status {
                sql.push_str(" AND status = ?");
                bound.push(status.clone());
            }
            if let Some(lane) = &lane {
                sql.push_str(" AND lane = ?");
                bound.push(lane.clone());
            }
            if let Some(mission_id) = &mission_id {
                sql.push_str(" AND mission_id = ?");
                bound.push(mission_id.clone());
            }
            sql.push_str(" ORDER BY started_at DESC");

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> =
                bound.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
            let rows = stmt
                .query_map(params.as_slice(), row_to_execution)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Every execution still `running` when the mission with `mission_id` stops
    /// transitions to `cancelled` (invariant 6, `spec` §3).
    pub async fn cancel_running_executions_for_mission(
        &self,
        mission_id: String,
        now: String,
    ) -> Result<Vec<String>, StoreError> {
        self.write(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM executions WHERE mission_id = ?1 AND status = 'running'",
            )?;
            let ids: Vec<String> = stmt
                .query_map(params![mission_id], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            for id in &ids {
                conn.execute(
                    "UPDATE executions SET status = 'cancelled', finished_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
            }
            Ok(ids)
        })
        .await
    }

    /// Invoked once at startup: any execution left `running` across a process
    /// restart is considered failed (`spec` §1 Non-goals).
    pub async fn fail_stale_running_executions(&self, now: String) -> Result<u64, StoreError> {
        self.write(move |conn| {
            let n = conn.execute(
                "UPDATE executions SET status = 'failed', finished_at = ?1, error = 'process restarted while running' WHERE status = 'running'",
                params![now],
            )?;
            Ok(n as u64)
        })
        .await
    }

    pub async fn count_executions(&self) -> Result<u64, StoreError> {
        self.read(|conn| {
            let n: i64 = conn.query_row("SELECT count(*) FROM executions", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }
}

fn row_to_execution(row: &Row<'_>) -> rusqlite::Result<Execution> {
    let lane: String = row.get("lane")?;
    let status: String = row.get("status")?;
    let inputs: String = row.get("inputs")?;
    let outputs: String = row.get("outputs")?;
    let metrics: String = row.get("metrics")?;
    Ok(Execution {
        id: row.get("id")?,
        proposal_id: row.get("proposal_id")?,
        mission_id: row.get("mission_id")?,
        lane: Lane::parse(&lane).unwrap_or(Lane::Html),
        status: parse_status(&status),
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
        approved_by: row.get("approved_by")?,
        inputs: serde_json::from_str(&inputs)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
        outputs: serde_json::from_str(&outputs)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
        logs_text: row.get("logs_text")?,
        error: row.get("error")?,
        metrics: serde_json::from_str(&metrics)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
    })
}

fn parse_status(value: &str) -> ExecutionStatus {
    match value {
        "queued" => ExecutionStatus::Queued,
        "running" => ExecutionStatus::Running,
        "succeeded" => ExecutionStatus::Succeeded,
        "cancelled" => ExecutionStatus::Cancelled,
        _ => ExecutionStatus::Failed,
    }
}
