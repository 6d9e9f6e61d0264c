use pulz_types::{Signal, SignalStatus};
use rusqlite::{params, OptionalExtension};

use crate::connection::{Store, StoreError};

impl Store {
    /// Inserts a signal if `id` is not already present. Returns `true` if a new
    /// row was written, `false` if the signal already existed (a no-op, per the
    /// "insert at most once" invariant).
    pub async fn insert_signal_if_absent(&self, signal: Signal) -> Result<bool, StoreError> {
        self.write(move |conn| {
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM signals WHERE id = ?1", params![signal.id], |row| {
                    row.get(0)
                })
                .optional()?;
            if exists.is_some() {
                return Ok(false);
            }

            conn.execute(
                "INSERT INTO signals
                    (id, source, url, title, body_excerpt, author, created_at, raw,
                     contact_hint, scored, proposal_id, status, inserted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    signal.id,
                    signal.source,
                    signal.url,
                    signal.title,
                    signal.body_excerpt,
                    signal.author,
                    signal.created_at,
                    serde_json::to_string(&signal.raw)?,
                    signal.contact_hint,
                    signal.scored.as_ref().map(serde_json::to_string).transpose()?,
                    signal.proposal_id,
                    status_str(signal.status),
                    signal.inserted_at,
                ],
            )?;
            Ok(true)
        })
        .await
    }

    pub async fn signal_exists(&self, id: String) -> Result<bool, StoreError> {
        self.read(move |conn| {
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM signals WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            Ok(exists.is_some())
        })
        .await
    }

    pub async fn attach_proposal_to_signal(
        &self,
        signal_id: String,
        proposal_id: String,
    ) -> Result<(), StoreError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE signals SET proposal_id = ?1 WHERE id = ?2",
                params![proposal_id, signal_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn count_signals_by_source(&self, source: String) -> Result<u64, StoreError> {
        self.read(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT count(*) FROM signals WHERE source = ?1",
                params![source],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
    }

    pub async fn count_signals(&self) -> Result<u64, StoreError> {
        self.read(|conn| {
            let n: i64 = conn.query_row("SELECT count(*) FROM signals", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }

    /// Every distinct `source` value ever recorded, for `/telemetry/summary`'s
    /// per-source ROI breakdown (`spec` §4.8).
    pub async fn distinct_sources(&self) -> Result<Vec<String>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT source FROM signals ORDER BY source")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

fn status_str(status: SignalStatus) -> &'static str {
    match status {
        SignalStatus::Queued => "queued",
        SignalStatus::Ignore => "ignore",
        SignalStatus::NeedsClarification => "needs_clarification",
    }
}
