//! Mission polling loop and lifecycle (`start`/`stop`/`status`), grounded on
//! `_mission_loop`/`_process_signal`/`_score_signal`/`_draft_proposal`/
//! `_status_payload` in `original_source/openwebui-patch/pulz_backend.py`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulz_classifier::classify;
use pulz_connectors::resolve_connector;
use pulz_core::{mission_id as make_mission_id, now_iso, proposal_id as make_proposal_id, EngineConfig};
use pulz_execution::CancellationRegistry;
use pulz_providers::OllamaClient;
use pulz_store::{Store, StoreError};
use pulz_telemetry::{record_event, record_tokens_used};
use pulz_types::{
    AuthorityMode, Category, ContactMethod, ExecutionMode, FeedEvent, Mission, MissionConfig,
    MissionRunStatus, MissionStartRequest, Proposal, ProposalData, ProposalStatus, Scoring, Signal,
    SignalStatus, StatusResponse,
};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::{Broadcaster, MissionStateHandle};

/// Minimum poll interval floor: even a rate below 1/min still sleeps a bounded
/// 60s between connector rounds, never an unbounded value (`SPEC_FULL.md` §4.5).
const MIN_POLL_SECONDS: f64 = 5.0;
/// Maximum poll interval ceiling: a rate below 1/min clamps the sleep at 60s
/// rather than growing unbounded (`spec.md` §4.5/§8, `SPEC_FULL.md` §4.5).
const MAX_POLL_SECONDS: f64 = 60.0;

/// Sleep between connector rounds for a given per-source rate, clamped to
/// `[MIN_POLL_SECONDS, MAX_POLL_SECONDS]` so a rate of zero or below 1/min
/// never produces an unbounded (or `Duration`-overflowing) sleep (`spec.md`
/// §4.5/§8 "Rate `r` < 1 yields sleep of 60 s, not unbounded").
fn poll_interval_seconds(rate_per_minute: f64) -> f64 {
    let rate = rate_per_minute.max(f64::MIN_POSITIVE);
    (60.0 / rate).clamp(MIN_POLL_SECONDS, MAX_POLL_SECONDS)
}

#[derive(Debug, Error)]
pub enum MissionStartError {
    #[error("mission already running")]
    AlreadyRunning,
    #[error("invalid authority mode")]
    InvalidAuthorityMode,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Owns the process-wide mission loop. One instance per running engine;
/// `start`/`stop` are safe to call concurrently with any in-flight loop tick.
#[derive(Clone)]
pub struct MissionEngine {
    store: Store,
    broadcaster: Broadcaster,
    config: EngineConfig,
    cancellations: CancellationRegistry,
    state: MissionStateHandle,
    ollama: Option<OllamaClient>,
    stop_flag: Arc<AtomicBool>,
    task: Arc<AsyncMutex<Option<JoinHandle<()>>>>,
}

impl MissionEngine {
    pub fn new(
        store: Store,
        broadcaster: Broadcaster,
        config: EngineConfig,
        cancellations: CancellationRegistry,
        state: MissionStateHandle,
    ) -> Self {
        let ollama = Some(OllamaClient::new(
            config.ollama_url.clone(),
            config.ollama_model.clone(),
        ));
        Self {
            store,
            broadcaster,
            config,
            cancellations,
            state,
            ollama,
            stop_flag: Arc::new(AtomicBool::new(false)),
            task: Arc::new(AsyncMutex::new(None)),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn state_handle(&self) -> &MissionStateHandle {
        &self.state
    }

    pub fn cancellations(&self) -> &CancellationRegistry {
        &self.cancellations
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn status(&self) -> StatusResponse {
        let state = self.state.snapshot().await;
        let items_per_min = match state.mission.as_ref().and_then(|m| {
            DateTime::parse_from_rfc3339(&m.started_at)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }) {
            Some(started_at) => {
                let elapsed_min = (Utc::now() - started_at).num_seconds().max(60) as f64 / 60.0;
                state.items_processed as f64 / elapsed_min
            }
            None => 0.0,
        };
        StatusResponse {
            state,
            items_per_min: (items_per_min * 100.0).round() / 100.0,
        }
    }

    pub async fn start(&self, req: MissionStartRequest) -> Result<StatusResponse, MissionStartError> {
        let running = self
            .state
            .snapshot()
            .await
            .mission
            .map(|m| m.status == MissionRunStatus::Running)
            .unwrap_or(false);
        if running {
            return Err(MissionStartError::AlreadyRunning);
        }

        let current_mode = self
            .state
            .snapshot()
            .await
            .mission
            .map(|m| m.authority_mode)
            .unwrap_or_default();
        let authority_mode = match req.authority_mode.as_deref() {
            Some(raw) => AuthorityMode::parse(raw).ok_or(MissionStartError::InvalidAuthorityMode)?,
            None => current_mode,
        };

        let duration_minutes = match req.duration_hours {
            Some(hours) => hours * 60.0,
            None => req.duration_minutes.unwrap_or(60.0),
        };

        let started_at_dt = Utc::now();
        let started_at = pulz_core::to_iso(started_at_dt);
        let ends_at = pulz_core::to_iso(started_at_dt + chrono::Duration::minutes(duration_minutes as i64));
        let id = make_mission_id(&started_at);

        let config = MissionConfig {
            sources: req.sources.clone(),
            rate_per_source_per_minute: req.rate_per_source_per_minute,
            max_items: req.max_items,
            authority_mode,
        };
        let mission = Mission {
            id: id.clone(),
            started_at: started_at.clone(),
            ends_at: ends_at.clone(),
            status: MissionRunStatus::Running,
            config: config.clone(),
            authority_mode,
        };

        self.store.insert_mission(mission.clone()).await?;

        self.stop_flag.store(false, Ordering::SeqCst);
        self.state
            .mutate(|s| {
                s.mission = Some(mission.clone());
                s.items_processed = 0;
                s.model_calls = 0;
                s.last_error = None;
                s.last_scan = None;
                s.token_usage = 0;
                s.execution_blocked = false;
            })
            .await;

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            engine.run_loop(mission).await;
        });
        *self.task.lock().await = Some(handle);

        Ok(self.status().await)
    }

    pub async fn stop(&self) -> Result<StatusResponse, StoreError> {
        let running = self
            .state
            .snapshot()
            .await
            .mission
            .map(|m| m.status == MissionRunStatus::Running)
            .unwrap_or(false);
        if !running {
            return Ok(self.status().await);
        }

        self.stop_flag.store(true, Ordering::SeqCst);
        self.state.mutate(|s| s.execution_blocked = true).await;

        let mission_id = self.state.snapshot().await.mission.map(|m| m.id);
        if let Some(mission_id) = mission_id {
            let now = now_iso();
            let cancelled = self
                .store
                .cancel_running_executions_for_mission(mission_id.clone(), now)
                .await?;
            for execution_id in cancelled {
                self.cancellations.cancel(&execution_id).await;
            }
        }

        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }

        Ok(self.status().await)
    }

    pub async fn set_authority_mode(
        &self,
        mission_id: String,
        authority_mode: AuthorityMode,
    ) -> Result<bool, StoreError> {
        let updated = self
            .store
            .set_mission_authority_mode(mission_id.clone(), authority_mode)
            .await?;
        if updated {
            self.state
                .mutate(|s| {
                    if let Some(mission) = s.mission.as_mut() {
                        if mission.id == mission_id {
                            mission.authority_mode = authority_mode;
                        }
                    }
                })
                .await;
        }
        Ok(updated)
    }

    async fn run_loop(&self, mission: Mission) {
        let mut connectors = Vec::new();
        for source in &mission.config.sources {
            if let Some(connector) = resolve_connector(source) {
                connectors.push(connector);
            }
        }

        if connectors.is_empty() {
            self.state
                .mutate(|s| s.last_error = Some("No valid connectors configured".to_string()))
                .await;
            self.finish_mission(&mission.id).await;
            return;
        }

        let ends_at = DateTime::parse_from_rfc3339(&mission.ends_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        while !self.stop_flag.load(Ordering::SeqCst) {
            self.state.mutate(|s| s.last_scan = Some(now_iso())).await;

            for connector in connectors.iter_mut() {
                if self.stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                let authority_mode = self
                    .state
                    .snapshot()
                    .await
                    .mission
                    .map(|m| m.authority_mode)
                    .unwrap_or(mission.authority_mode);

                match connector.fetch_signals().await {
                    Ok(signals) => {
                        for signal in signals {
                            if self.stop_flag.load(Ordering::SeqCst) {
                                break;
                            }
                            let items_processed = self.state.snapshot().await.items_processed;
                            if items_processed >= mission.config.max_items as u64 {
                                self.stop_flag.store(true, Ordering::SeqCst);
                                break;
                            }
                            if let Err(err) = self
                                .process_signal(&mission.id, authority_mode, signal)
                                .await
                            {
                                self.state
                                    .mutate(|s| {
                                        s.last_error =
                                            Some(format!("{}: {err}", connector.source_name()))
                                    })
                                    .await;
                            }
                        }
                        let sleep_secs = poll_interval_seconds(mission.config.rate_per_source_per_minute);
                        tokio::time::sleep(std::time::Duration::from_secs_f64(sleep_secs)).await;
                    }
                    Err(err) => {
                        self.state
                            .mutate(|s| {
                                s.last_error = Some(format!("{}: {err}", connector.source_name()))
                            })
                            .await;
                    }
                }
            }

            if Utc::now() >= ends_at {
                self.stop_flag.store(true, Ordering::SeqCst);
            }
        }

        self.finish_mission(&mission.id).await;
    }

    async fn finish_mission(&self, mission_id: &str) {
        let _ = self
            .store
            .set_mission_status(mission_id.to_string(), MissionRunStatus::Stopped)
            .await;
        self.state
            .mutate(|s| {
                if let Some(mission) = s.mission.as_mut() {
                    mission.status = MissionRunStatus::Stopped;
                }
            })
            .await;
    }

    /// Dedups, scores, optionally drafts a proposal, persists the signal, and
    /// broadcasts the result. Mirrors `_process_signal` step for step.
    async fn process_signal(
        &self,
        mission_id: &str,
        authority_mode: AuthorityMode,
        signal: Signal,
    ) -> Result<(), StoreError> {
        if self.store.signal_exists(signal.id.clone()).await? {
            return Ok(());
        }

        let outcome = classify(&signal.title, &signal.body_excerpt, self.ollama.as_ref()).await;
        let scoring = outcome.scoring;

        record_tokens_used(
            &self.store,
            Some(mission_id.to_string()),
            None,
            outcome.token_usage.tokens,
            &outcome.token_usage.provider,
        )
        .await?;
        if outcome.llm_assisted {
            record_event(
                &self.store,
                Some(mission_id.to_string()),
                None,
                None,
                "model_call",
                serde_json::json!({ "provider": outcome.token_usage.provider }),
            )
            .await?;
        }
        record_event(
            &self.store,
            Some(mission_id.to_string()),
            None,
            None,
            "connector_item",
            serde_json::json!({ "source": signal.source, "signal_id": signal.id }),
        )
        .await?;

        self.state
            .mutate(|s| {
                s.token_usage += outcome.token_usage.tokens;
                if outcome.llm_assisted {
                    s.model_calls += 1;
                }
            })
            .await;

        let mut proposal_id = None;
        let mut proposal_data = None;
        let draft_allowed = scoring.recommended_next_action == pulz_types::RecommendedAction::DraftProposal
            && authority_mode != AuthorityMode::ScanOnly;
        if draft_allowed {
            let data = draft_proposal(&signal, &scoring);
            let status = if authority_mode == AuthorityMode::DraftOnly {
                ProposalStatus::Draft
            } else {
                ProposalStatus::Queued
            };
            let execution_mode = if authority_mode == AuthorityMode::ExecuteAfterApproval {
                ExecutionMode::AutoAfterApproval
            } else {
                ExecutionMode::Manual
            };
            let now = now_iso();
            let id = make_proposal_id(&signal.id, &now);
            let proposal = Proposal {
                id: id.clone(),
                signal_id: signal.id.clone(),
                status,
                created_at: now.clone(),
                updated_at: now,
                approved_at: None,
                executing_at: None,
                executed_at: None,
                execution_mode,
                mission_id: Some(mission_id.to_string()),
                estimated_revenue_cents: None,
                realized_revenue_cents: None,
                data: data.clone(),
            };
            self.store.insert_proposal(proposal).await?;
            record_event(
                &self.store,
                Some(mission_id.to_string()),
                Some(id.clone()),
                None,
                "proposal_created",
                serde_json::json!({ "source": signal.source, "proposal_id": id, "status": status }),
            )
            .await?;
            proposal_id = Some(id);
            proposal_data = Some(data);
        }

        let status = if proposal_id.is_some() {
            SignalStatus::Queued
        } else {
            match scoring.recommended_next_action {
                pulz_types::RecommendedAction::NeedsClarification => SignalStatus::NeedsClarification,
                _ => SignalStatus::Ignore,
            }
        };

        let stored_signal = Signal {
            scored: Some(scoring.clone()),
            proposal_id: proposal_id.clone(),
            status,
            ..signal.clone()
        };
        self.store.insert_signal_if_absent(stored_signal.clone()).await?;
        self.state.mutate(|s| s.items_processed += 1).await;

        self.broadcaster
            .publish(FeedEvent::new(
                "signal",
                serde_json::json!({
                    "signal": stored_signal,
                    "scoring": scoring,
                    "proposal": proposal_data,
                    "proposal_id": proposal_id,
                }),
            ))
            .await;

        Ok(())
    }
}

/// Builds a proposal draft from a scored signal: contact method branches on
/// the connector-family source prefix, message template mirrors
/// `_draft_proposal`'s fixed wording exactly.
fn draft_proposal(signal: &Signal, scoring: &Scoring) -> ProposalData {
    let contact_method = if signal.source.starts_with("reddit:") {
        ContactMethod {
            channel: "reddit".to_string(),
            handle: signal.author.clone(),
            author: None,
            permalink: Some(signal.url.clone()),
            url: None,
            link: None,
        }
    } else if signal.source.starts_with("rss:") {
        ContactMethod {
            channel: "rss".to_string(),
            handle: None,
            author: signal.author.clone(),
            permalink: None,
            url: Some(signal.url.clone()),
            link: None,
        }
    } else {
        ContactMethod {
            channel: "unknown".to_string(),
            handle: signal.author.clone(),
            author: None,
            permalink: None,
            url: None,
            link: Some(signal.url.clone()),
        }
    };

    let message = format!(
        "Hi there! I saw your post and can help with a fast-turnaround solution.\n\n\
         Summary: {}\n\
         Approach: {} with a focused scope and quick delivery.\n\
         Estimated delivery: {} minutes of build time.\n\
         Price range: {}.\n\n\
         If helpful, I can outline a short scope and timeline based on your exact requirements.",
        signal.title,
        category_label(scoring.category),
        scoring.estimated_build_time_minutes,
        scoring.suggested_price_range,
    );

    ProposalData {
        problem_summary: if signal.body_excerpt.is_empty() {
            signal.title.clone()
        } else {
            signal.body_excerpt.clone()
        },
        solution_options: vec![
            "Lean MVP with core workflow and export".to_string(),
            "Enhanced version with templates + automation hooks".to_string(),
        ],
        suggested_price_range: scoring.suggested_price_range.clone(),
        estimated_build_time_minutes: scoring.estimated_build_time_minutes,
        message_template: message,
        contact_method,
    }
}

fn category_label(category: Category) -> &'static str {
    match category {
        Category::DocGenerator => "Doc generator / template tool",
        Category::Automation => "Automation / integration request",
        Category::MicroSaas => "Small web app / micro SaaS",
        Category::Ignore => "Custom build",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulz_types::{Feasibility, RecommendedAction, RiskFlag};

    #[test]
    fn poll_interval_floors_at_min_for_high_rates() {
        assert_eq!(poll_interval_seconds(30.0), MIN_POLL_SECONDS);
    }

    #[test]
    fn poll_interval_caps_at_sixty_for_sub_one_rates() {
        assert_eq!(poll_interval_seconds(0.5), MAX_POLL_SECONDS);
        assert_eq!(poll_interval_seconds(0.01), MAX_POLL_SECONDS);
    }

    #[test]
    fn poll_interval_handles_zero_rate_without_overflow() {
        let secs = poll_interval_seconds(0.0);
        assert_eq!(secs, MAX_POLL_SECONDS);
        // Must not panic constructing a Duration from this value.
        let _ = std::time::Duration::from_secs_f64(secs);
    }

    fn sample_signal(source: &str) -> Signal {
        Signal {
            id: "sig-1".to_string(),
            source: source.to_string(),
            url: "https://example.com/post".to_string(),
            title: "Need a resume template".to_string(),
            body_excerpt: "looking for a generator".to_string(),
            author: Some("alice".to_string()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            raw: serde_json::json!({}),
            contact_hint: None,
            scored: None,
            proposal_id: None,
            status: SignalStatus::Queued,
            inserted_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn sample_scoring() -> Scoring {
        Scoring {
            category: Category::DocGenerator,
            feasibility: Feasibility::High,
            estimated_build_time_minutes: 240,
            suggested_price_range: "$600 - $1,500".to_string(),
            risk_flags: Vec::<RiskFlag>::new(),
            recommended_next_action: RecommendedAction::DraftProposal,
            rationale: "keyword heuristic".to_string(),
        }
    }

    #[test]
    fn reddit_source_yields_reddit_contact_method() {
        let signal = sample_signal("reddit:r/smallbusiness");
        let data = draft_proposal(&signal, &sample_scoring());
        assert_eq!(data.contact_method.channel, "reddit");
        assert_eq!(data.contact_method.permalink.as_deref(), Some("https://example.com/post"));
    }

    #[test]
    fn rss_source_yields_rss_contact_method() {
        let signal = sample_signal("rss:rss_forhire");
        let data = draft_proposal(&signal, &sample_scoring());
        assert_eq!(data.contact_method.channel, "rss");
        assert_eq!(data.contact_method.url.as_deref(), Some("https://example.com/post"));
        assert_eq!(data.contact_method.author.as_deref(), Some("alice"));
        assert!(data.contact_method.handle.is_none());
    }

    #[test]
    fn unknown_source_yields_unknown_contact_method() {
        let signal = sample_signal("manual:x");
        let data = draft_proposal(&signal, &sample_scoring());
        assert_eq!(data.contact_method.channel, "unknown");
        assert_eq!(data.contact_method.link.as_deref(), Some("https://example.com/post"));
    }

    #[test]
    fn draft_falls_back_to_title_when_body_excerpt_empty() {
        let mut signal = sample_signal("reddit:r/x");
        signal.body_excerpt = String::new();
        let data = draft_proposal(&signal, &sample_scoring());
        assert_eq!(data.problem_summary, signal.title);
    }
}
