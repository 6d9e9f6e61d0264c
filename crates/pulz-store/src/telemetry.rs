use pulz_types::TelemetryEvent;
use rusqlite::{params, Row};

use crate::connection::{Store, StoreError};

impl Store {
    pub async fn insert_telemetry_event(&self, event: TelemetryEvent) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "INSERT INTO telemetry_events (id, ts, mission_id, proposal_id, execution_id, type, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.id,
                    event.ts,
                    event.mission_id,
                    event.proposal_id,
                    event.execution_id,
                    event.event_type,
                    serde_json::to_string(&event.payload)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_telemetry_by_type(&self, event_type: String) -> Result<Vec<TelemetryEvent>, StoreError> {
        self.read(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM telemetry_events WHERE type = ?1 ORDER BY ts ASC",
            )?;
            let rows = stmt
                .query_map(params![event_type], row_to_event)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn all_telemetry_events(&self) -> Result<Vec<TelemetryEvent>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM telemetry_events ORDER BY ts ASC")?;
            let rows = stmt
                .query_map([], row_to_event)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<TelemetryEvent> {
    let payload: String = row.get("payload")?;
    Ok(TelemetryEvent {
        id: row.get("id")?,
        ts: row.get("ts")?,
        mission_id: row.get("mission_id")?,
        proposal_id: row.get("proposal_id")?,
        execution_id: row.get("execution_id")?,
        event_type: row.get("type")?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
    })
}
