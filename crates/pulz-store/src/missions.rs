use pulz_types::{AuthorityMode, Mission, MissionConfig, MissionRunStatus};
use rusqlite::{params, OptionalExtension, Row};

use crate::connection::{Store, StoreError};

impl Store {
    pub async fn insert_mission(&self, mission: Mission) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "INSERT INTO missions (id, started_at, ends_at, status, config, authority_mode)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    mission.id,
                    mission.started_at,
                    mission.ends_at,
                    status_str(mission.status),
                    serde_json::to_string(&mission.config)?,
                    mission.authority_mode.as_str(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_mission(&self, id: String) -> Result<Option<Mission>, StoreError> {
        self.read(move |conn| {
            conn.query_row("SELECT * FROM missions WHERE id = ?1", params![id], row_to_mission)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    pub async fn set_mission_status(
        &self,
        id: String,
        status: MissionRunStatus,
    ) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE missions SET status = ?1 WHERE id = ?2",
                params![status_str(status), id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_mission_authority_mode(
        &self,
        id: String,
        authority_mode: AuthorityMode,
    ) -> Result<bool, StoreError> {
        self.write(move |conn| {
            let n = conn.execute(
                "UPDATE missions SET authority_mode = ?1 WHERE id = ?2",
                params![authority_mode.as_str(), id],
            )?;
            Ok(n > 0)
        })
        .await
    }
}

fn row_to_mission(row: &Row<'_>) -> rusqlite::Result<Mission> {
    let status: String = row.get("status")?;
    let config: String = row.get("config")?;
    let authority_mode: String = row.get("authority_mode")?;
    Ok(Mission {
        id: row.get("id")?,
        started_at: row.get("started_at")?,
        ends_at: row.get("ends_at")?,
        status: parse_status(&status),
        config: serde_json::from_str::<MissionConfig>(&config)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
        authority_mode: AuthorityMode::parse(&authority_mode).unwrap_or_default(),
    })
}

fn status_str(status: MissionRunStatus) -> &'static str {
    match status {
        MissionRunStatus::Running => "running",
        MissionRunStatus::Stopped => "stopped",
    }
}

fn parse_status(value: &str) -> MissionRunStatus {
    match value {
        "running" => MissionRunStatus::Running,
        _ => MissionRunStatus::Stopped,
    }
}
