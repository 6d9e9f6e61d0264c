use pulz_core::{now_iso, telemetry_id};
use pulz_store::{Store, StoreError};
use pulz_types::TelemetryEvent;
use serde_json::Value;

/// Writes one [`TelemetryEvent`] row and mirrors it through `tracing`, so
/// operators get structured logs independent of the SQLite-backed event
/// table (`SPEC_FULL.md` §4.8). Every meaningful engine step funnels through
/// this function rather than inserting rows directly.
pub async fn record_event(
    store: &Store,
    mission_id: Option<String>,
    proposal_id: Option<String>,
    execution_id: Option<String>,
    event_type: &str,
    payload: Value,
) -> Result<TelemetryEvent, StoreError> {
    let now = now_iso();
    let event = TelemetryEvent {
        id: telemetry_id(event_type, &now),
        ts: now,
        mission_id,
        proposal_id,
        execution_id,
        event_type: event_type.to_string(),
        payload,
    };
    store.insert_telemetry_event(event.clone()).await?;
    tracing::info!(
        event = %event.event_type,
        mission_id = event.mission_id.as_deref().unwrap_or(""),
        proposal_id = event.proposal_id.as_deref().unwrap_or(""),
        execution_id = event.execution_id.as_deref().unwrap_or(""),
        payload = %event.payload,
        "telemetry_event"
    );
    Ok(event)
}

/// Convenience wrapper for the `tokens_used` event emitted by the classifier
/// (`spec` §4.3 step 7 / §3 invariant 5): records a non-negative token count
/// tagged with a provider name.
pub async fn record_tokens_used(
    store: &Store,
    mission_id: Option<String>,
    proposal_id: Option<String>,
    tokens: u64,
    provider: &str,
) -> Result<TelemetryEvent, StoreError> {
    record_event(
        store,
        mission_id,
        proposal_id,
        None,
        "tokens_used",
        serde_json::json!({ "tokens": tokens, "provider": provider }),
    )
    .await
}
