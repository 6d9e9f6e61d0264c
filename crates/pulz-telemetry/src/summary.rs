use std::collections::HashMap;

use pulz_core::config::CostTable;
use pulz_core::truncate_to_hour;
use pulz_store::{Store, StoreError};
use serde::Serialize;

/// `/telemetry/summary` response shape, computed exactly per `spec.md` §4.8.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySummary {
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub tokens_over_time: Vec<TokenBucket>,
    pub cost_per_signal: f64,
    pub cost_per_proposal: f64,
    pub cost_per_execution: f64,
    pub roi_by_source: HashMap<String, RoiEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenBucket {
    pub hour: String,
    pub tokens: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoiEntry {
    pub signals: u64,
    pub cost_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi: Option<f64>,
}

/// Computes the full `/telemetry/summary` payload. `cost_table` supplies the
/// per-provider USD rate per 1M tokens (`COST_PER_1M_TOKENS_USD`, `spec` §6).
pub async fn telemetry_summary(
    store: &Store,
    cost_table: &CostTable,
) -> Result<TelemetrySummary, StoreError> {
    let events = store.all_telemetry_events().await?;

    let mut total_tokens: u64 = 0;
    let mut total_cost_usd: f64 = 0.0;
    let mut by_hour: HashMap<String, u64> = HashMap::new();

    for event in &events {
        if event.event_type != "tokens_used" {
            continue;
        }
        let tokens = event
            .payload
            .get("tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let provider = event
            .payload
            .get("provider")
            .and_then(|v| v.as_str())
            .unwrap_or("default");
        total_tokens += tokens;
        total_cost_usd += (tokens as f64 / 1_000_000.0) * cost_table.rate_for(provider);
        let bucket = by_hour.entry(truncate_to_hour(&event.ts)).or_insert(0);
        *bucket += tokens;
    }

    let mut tokens_over_time: Vec<TokenBucket> = by_hour
        .into_iter()
        .map(|(hour, tokens)| TokenBucket { hour, tokens })
        .collect();
    tokens_over_time.sort_by(|a, b| a.hour.cmp(&b.hour));

    let signal_count = store.count_signals().await?;
    let proposal_count = store.count_proposals().await?;
    let execution_count = store.count_executions().await?;

    let cost_per_signal = cost_per(total_cost_usd, signal_count);
    let cost_per_proposal = cost_per(total_cost_usd, proposal_count);
    let cost_per_execution = cost_per(total_cost_usd, execution_count);

    let sources = store.distinct_sources().await?;
    let revenue_by_source = store.realized_revenue_by_signal_source().await?;

    let mut roi_by_source = HashMap::new();
    for source in sources {
        let signals = store.count_signals_by_source(source.clone()).await?;
        let cost_usd = cost_per_signal * signals as f64;
        let revenue_cents = revenue_by_source.get(&source).copied();
        let roi = revenue_cents.and_then(|cents| {
            if cost_usd > 0.0 {
                Some((cents as f64 / 100.0) / cost_usd)
            } else {
                None
            }
        });
        roi_by_source.insert(
            source,
            RoiEntry {
                signals,
                cost_usd,
                revenue_cents,
                roi,
            },
        );
    }

    Ok(TelemetrySummary {
        total_tokens,
        total_cost_usd,
        tokens_over_time,
        cost_per_signal,
        cost_per_proposal,
        cost_per_execution,
        roi_by_source,
    })
}

fn cost_per(total_cost_usd: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_cost_usd / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulz_types::{Signal, SignalStatus, TelemetryEvent};

    async fn seeded_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("engine.sqlite3")).await.unwrap();
        std::mem::forget(dir);
        store
    }

    #[tokio::test]
    async fn roi_by_source_computes_revenue_over_cost() {
        let store = seeded_store().await;
        for i in 0..2 {
            store
                .insert_signal_if_absent(Signal {
                    id: format!("sig-{i}"),
                    source: "rss:X".to_string(),
                    url: format!("https://example.com/{i}"),
                    title: "Need a tool".to_string(),
                    body_excerpt: "looking for automation".to_string(),
                    author: None,
                    created_at: "2026-01-01T00:00:00Z".to_string(),
                    raw: serde_json::json!({}),
                    contact_hint: None,
                    scored: None,
                    proposal_id: None,
                    status: SignalStatus::Queued,
                    inserted_at: "2026-01-01T00:00:00Z".to_string(),
                })
                .await
                .unwrap();
        }
        store
            .insert_telemetry_event(TelemetryEvent {
                id: "tok-1".to_string(),
                ts: "2026-01-01T00:00:00Z".to_string(),
                mission_id: None,
                proposal_id: None,
                execution_id: None,
                event_type: "tokens_used".to_string(),
                payload: serde_json::json!({"tokens": 1_000_000, "provider": "default"}),
            })
            .await
            .unwrap();

        let cost_table = CostTable::default();
        let summary = telemetry_summary(&store, &cost_table).await.unwrap();
        assert_eq!(summary.total_tokens, 1_000_000);
        assert!((summary.total_cost_usd - 2.0).abs() < 1e-9);

        let entry = summary.roi_by_source.get("rss:X").unwrap();
        assert_eq!(entry.signals, 2);
        // No realized revenue recorded yet: roi stays None, not zero.
        assert!(entry.roi.is_none());
    }

    #[tokio::test]
    async fn zero_denominators_yield_zero_cost_per_unit() {
        let store = seeded_store().await;
        let cost_table = CostTable::default();
        let summary = telemetry_summary(&store, &cost_table).await.unwrap();
        assert_eq!(summary.cost_per_signal, 0.0);
        assert_eq!(summary.cost_per_proposal, 0.0);
        assert_eq!(summary.cost_per_execution, 0.0);
    }
}
