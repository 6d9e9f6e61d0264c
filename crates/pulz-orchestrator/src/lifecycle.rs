//! Proposal lifecycle (`approve`/`reject`/`execute`/`cancel`) and execution
//! dispatch, wiring the mission engine to `pulz-execution`'s lanes
//! (`SPEC_FULL.md` §4.6/§4.7). `MissionEngineHandle` is the one type the
//! HTTP layer holds: it delegates mission start/stop/status to
//! [`MissionEngine`] and owns everything execution-shaped on top of it.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use pulz_core::{artifact_id, now_iso, EngineConfig};
use pulz_execution::{
    resolve_executor, sha256_hex, CancellationRegistry, ExecutionContext, ExecutorError,
    ProgressSink,
};
use pulz_store::{Store, StoreError};
use pulz_telemetry::record_event;
use pulz_types::{
    Artifact, ArtifactKind, AuthorityMode, Execution, ExecutionMetrics, ExecutionMode,
    ExecutionStatus, FeedEvent, Lane, MissionStartRequest, Proposal, ProposalStatus,
    StatusResponse,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::mission::{MissionEngine, MissionStartError};
use crate::Broadcaster;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("proposal not found")]
    ProposalNotFound,
    #[error("execution not found")]
    ExecutionNotFound,
    #[error("invalid lane")]
    InvalidLane,
    #[error("proposal status does not allow this transition")]
    InvalidTransition,
    #[error("proposal already has an execution in progress")]
    ExecutionInProgress,
    #[error("execution is blocked")]
    ExecutionBlocked,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Wraps a [`MissionEngine`] with proposal approval/rejection and execution
/// dispatch. Cloning is cheap; every clone shares the same underlying state.
#[derive(Clone)]
pub struct MissionEngineHandle {
    engine: MissionEngine,
}

impl MissionEngineHandle {
    pub fn new(engine: MissionEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &MissionEngine {
        &self.engine
    }

    pub fn store(&self) -> &Store {
        self.engine.store()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        self.engine.broadcaster()
    }

    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    pub async fn status(&self) -> StatusResponse {
        self.engine.status().await
    }

    pub async fn start(&self, req: MissionStartRequest) -> Result<StatusResponse, MissionStartError> {
        self.engine.start(req).await
    }

    pub async fn stop(&self) -> Result<StatusResponse, StoreError> {
        self.engine.stop().await
    }

    pub async fn set_authority_mode(
        &self,
        mission_id: String,
        authority_mode: AuthorityMode,
    ) -> Result<bool, StoreError> {
        self.engine.set_authority_mode(mission_id, authority_mode).await
    }

    /// `POST /queue/{id}/approve`. Writes an inline JSON snapshot artifact,
    /// then — for `auto_after_approval` proposals — synchronously enqueues a
    /// default-lane (`html`) execution, swallowing a blocked kill-switch into
    /// `execution_id: None` rather than failing the approval (`spec` §4.6).
    pub async fn approve(&self, proposal_id: String) -> Result<ApproveOutcome, LifecycleError> {
        let proposal = self
            .store()
            .get_proposal(proposal_id.clone())
            .await?
            .ok_or(LifecycleError::ProposalNotFound)?;

        if !matches!(proposal.status, ProposalStatus::Queued | ProposalStatus::Draft) {
            return Err(LifecycleError::InvalidTransition);
        }

        let now = now_iso();
        self.store()
            .update_proposal_status(
                proposal_id.clone(),
                ProposalStatus::Approved,
                Some("approved_at"),
                now.clone(),
            )
            .await?;

        let artifact = self.write_approval_snapshot(&proposal, &now).await?;

        record_event(
            self.store(),
            proposal.mission_id.clone(),
            Some(proposal_id.clone()),
            None,
            "proposal_approved",
            json!({ "proposal_id": proposal_id }),
        )
        .await?;
        self.broadcaster()
            .publish(FeedEvent::new(
                "proposal_approved",
                json!({ "proposal_id": proposal_id, "artifact_id": artifact.id }),
            ))
            .await;

        let mut approved = proposal.clone();
        approved.status = ProposalStatus::Approved;
        approved.approved_at = Some(now);

        let execution_id = if approved.execution_mode == ExecutionMode::AutoAfterApproval {
            if self.engine.state_handle().snapshot().await.execution_blocked {
                None
            } else {
                match self.enqueue_execution(approved, Lane::Html, None).await {
                    Ok(id) => Some(id),
                    Err(LifecycleError::ExecutionBlocked) => None,
                    Err(err) => return Err(err),
                }
            }
        } else {
            None
        };

        Ok(ApproveOutcome {
            artifact_id: artifact.id,
            execution_id,
        })
    }

    /// `POST /queue/{id}/reject`. Unconditionally transitions to `cancelled`
    /// (`spec` §4.6).
    pub async fn reject(&self, proposal_id: String) -> Result<(), LifecycleError> {
        let proposal = self
            .store()
            .get_proposal(proposal_id.clone())
            .await?
            .ok_or(LifecycleError::ProposalNotFound)?;

        let now = now_iso();
        self.store()
            .update_proposal_status(proposal_id.clone(), ProposalStatus::Cancelled, None, now)
            .await?;

        record_event(
            self.store(),
            proposal.mission_id,
            Some(proposal_id.clone()),
            None,
            "proposal_rejected",
            json!({ "proposal_id": proposal_id }),
        )
        .await?;
        self.broadcaster()
            .publish(FeedEvent::new(
                "proposal_rejected",
                json!({ "proposal_id": proposal_id }),
            ))
            .await;
        Ok(())
    }

    /// `POST /proposals/{id}/execute`. Requires `approved`, or a terminal
    /// status with `allow_rerun` asserted (`spec` §3 invariant 4, §4.6).
    pub async fn execute(
        &self,
        proposal_id: String,
        lane: &str,
        allow_rerun: bool,
    ) -> Result<String, LifecycleError> {
        let lane = Lane::parse(lane).ok_or(LifecycleError::InvalidLane)?;
        let proposal = self
            .store()
            .get_proposal(proposal_id.clone())
            .await?
            .ok_or(LifecycleError::ProposalNotFound)?;

        let allowed = proposal.status == ProposalStatus::Approved
            || (proposal.status.is_terminal() && allow_rerun);
        if !allowed {
            return Err(LifecycleError::InvalidTransition);
        }

        self.enqueue_execution(proposal, lane, None).await
    }

    /// Per-execution cancel API. Fires the cooperative cancel token and
    /// finalises the store/proposal/event trail immediately rather than
    /// waiting for the running task to notice — idempotent against the task
    /// also finalising once it observes cancellation (`spec` §4.7 step 5,
    /// §5 "Cancellation and timeouts").
    pub async fn cancel_execution(&self, execution_id: String) -> Result<(), LifecycleError> {
        let execution = self
            .store()
            .get_execution(execution_id.clone())
            .await?
            .ok_or(LifecycleError::ExecutionNotFound)?;

        self.engine.cancellations().cancel(&execution_id).await;

        if execution.status.is_terminal() {
            return Ok(());
        }

        self.finalize(
            &execution_id,
            &execution.proposal_id,
            execution.mission_id.as_deref(),
            FinishOutcome::Cancelled,
        )
        .await
    }

    async fn write_approval_snapshot(
        &self,
        proposal: &Proposal,
        now: &str,
    ) -> Result<Artifact, LifecycleError> {
        let id = artifact_id(&proposal.id, now);
        let snapshot = json!({ "proposal": proposal });
        let text = serde_json::to_string_pretty(&snapshot)?;
        let bytes = text.clone().into_bytes();

        let dir = self.config().artifacts_dir().join("approvals").join(&proposal.id);
        let path = dir.join(format!("{id}.json"));
        write_file(dir, path.clone(), bytes.clone()).await?;

        let artifact = Artifact {
            id: id.clone(),
            proposal_id: proposal.id.clone(),
            execution_id: None,
            created_at: now.to_string(),
            kind: ArtifactKind::Json,
            path: path.display().to_string(),
            sha256: sha256_hex(&bytes),
            data: Some(snapshot),
            text: Some(text),
        };
        self.store().insert_artifact(artifact.clone()).await?;
        Ok(artifact)
    }

    /// Creates an `Execution` row, registers its cancel token, and spawns the
    /// task that drives it through `plan`/`run`/finalisation (`spec` §4.7).
    async fn enqueue_execution(
        &self,
        proposal: Proposal,
        lane: Lane,
        approved_by: Option<String>,
    ) -> Result<String, LifecycleError> {
        if self.engine.state_handle().snapshot().await.execution_blocked {
            return Err(LifecycleError::ExecutionBlocked);
        }
        if self.store().has_active_execution(proposal.id.clone()).await? {
            return Err(LifecycleError::ExecutionInProgress);
        }

        let execution_id = uuid::Uuid::new_v4().to_string();
        let now = now_iso();
        let execution = Execution {
            id: execution_id.clone(),
            proposal_id: proposal.id.clone(),
            mission_id: proposal.mission_id.clone(),
            lane,
            status: ExecutionStatus::Queued,
            started_at: now.clone(),
            finished_at: None,
            approved_by,
            inputs: json!({ "proposal": proposal }),
            outputs: json!({}),
            logs_text: String::new(),
            error: None,
            metrics: ExecutionMetrics::default(),
        };
        self.store().insert_execution(execution).await?;
        self.store()
            .update_proposal_status(
                proposal.id.clone(),
                ProposalStatus::Executing,
                Some("executing_at"),
                now.clone(),
            )
            .await?;

        record_event(
            self.store(),
            proposal.mission_id.clone(),
            Some(proposal.id.clone()),
            Some(execution_id.clone()),
            "execution_queued",
            json!({ "lane": lane.as_str() }),
        )
        .await?;
        self.broadcaster()
            .publish(FeedEvent::new(
                "execution_queued",
                json!({ "execution_id": execution_id, "proposal_id": proposal.id, "lane": lane.as_str() }),
            ))
            .await;

        let token = self.engine.cancellations().register(&execution_id).await;
        let worker = ExecutionWorker {
            store: self.store().clone(),
            broadcaster: self.broadcaster().clone(),
            cancellations: self.engine.cancellations().clone(),
            output_root: self.config().artifacts_dir(),
        };
        let cancel_execution_id = execution_id.clone();
        tokio::spawn(async move {
            worker.run(cancel_execution_id, proposal, lane, token).await;
        });

        Ok(execution_id)
    }

    async fn finalize(
        &self,
        execution_id: &str,
        proposal_id: &str,
        mission_id: Option<&str>,
        outcome: FinishOutcome,
    ) -> Result<(), LifecycleError> {
        finalize_execution(
            self.store(),
            self.broadcaster(),
            execution_id,
            proposal_id,
            mission_id,
            outcome,
        )
        .await
        .map_err(LifecycleError::from)
    }
}

pub struct ApproveOutcome {
    pub artifact_id: String,
    pub execution_id: Option<String>,
}

enum FinishOutcome {
    Succeeded { outputs: Value, metrics: ExecutionMetrics },
    Failed { error: String },
    Cancelled,
}

/// Drives one execution end to end: `plan`, `run`, artifact capture, and the
/// terminal store/proposal/event transition (`spec` §4.7 steps 1-5).
struct ExecutionWorker {
    store: Store,
    broadcaster: Broadcaster,
    cancellations: CancellationRegistry,
    output_root: PathBuf,
}

impl ExecutionWorker {
    async fn run(&self, execution_id: String, proposal: Proposal, lane: Lane, token: tokio_util::sync::CancellationToken) {
        let mission_id = proposal.mission_id.clone();
        let result = self.drive(&execution_id, &proposal, lane, token).await;
        self.cancellations.remove(&execution_id).await;

        let outcome = match result {
            Ok((outputs, metrics)) => FinishOutcome::Succeeded { outputs, metrics },
            Err(ExecutorError::Cancelled) => FinishOutcome::Cancelled,
            Err(err) => FinishOutcome::Failed { error: err.to_string() },
        };

        let _ = finalize_execution(
            &self.store,
            &self.broadcaster,
            &execution_id,
            &proposal.id,
            mission_id.as_deref(),
            outcome,
        )
        .await;
    }

    async fn drive(
        &self,
        execution_id: &str,
        proposal: &Proposal,
        lane: Lane,
        token: tokio_util::sync::CancellationToken,
    ) -> Result<(Value, ExecutionMetrics), ExecutorError> {
        let executor = resolve_executor(lane);
        let ctx = ExecutionContext {
            output_dir: self.output_root.clone(),
            mission_id: proposal.mission_id.clone(),
            cancel: token,
        };

        self.store
            .update_execution_status(execution_id.to_string(), ExecutionStatus::Running, None, None)
            .await
            .ok();
        record_event(
            &self.store,
            proposal.mission_id.clone(),
            Some(proposal.id.clone()),
            Some(execution_id.to_string()),
            "execution_started",
            json!({ "lane": lane.as_str() }),
        )
        .await
        .ok();
        self.broadcaster
            .publish(FeedEvent::new(
                "execution_started",
                json!({ "execution_id": execution_id, "proposal_id": proposal.id, "lane": lane.as_str() }),
            ))
            .await;

        let started = Instant::now();
        let plan = executor.plan(proposal, &ctx).await?;
        self.broadcaster
            .publish(FeedEvent::new(
                "execution_progress",
                json!({ "execution_id": execution_id, "stage": "planned", "plan": plan }),
            ))
            .await;

        let progress = FeedProgress {
            store: self.store.clone(),
            broadcaster: self.broadcaster.clone(),
            execution_id: execution_id.to_string(),
            proposal_id: proposal.id.clone(),
            mission_id: proposal.mission_id.clone(),
        };
        let outcome = executor.run(execution_id, proposal, &ctx, &progress).await?;

        let exec_dir = self.output_root.join(execution_id).join(lane.as_str());
        let mut artifact_count = 0u32;
        for file in &outcome.artifacts {
            let path = exec_dir.join(&file.filename);
            write_file(exec_dir.clone(), path.clone(), file.bytes.clone()).await?;
            let sha256 = sha256_hex(&file.bytes);
            let artifact = Artifact {
                id: artifact_id(&format!("{execution_id}:{}", file.filename), &now_iso()),
                proposal_id: proposal.id.clone(),
                execution_id: Some(execution_id.to_string()),
                created_at: now_iso(),
                kind: file.kind,
                path: path.display().to_string(),
                sha256,
                data: None,
                text: file.text.clone(),
            };
            self.store.insert_artifact(artifact.clone()).await.map_err(artifact_store_err)?;
            artifact_count += 1;
            self.broadcaster
                .publish(FeedEvent::new(
                    "execution_artifact",
                    json!({ "execution_id": execution_id, "artifact_id": artifact.id, "filename": file.filename }),
                ))
                .await;
        }

        let mut metrics = outcome.metrics;
        metrics.plan = Some(serde_json::to_value(&plan).unwrap_or(Value::Null));
        metrics.elapsed_seconds = Some(started.elapsed().as_secs_f64());
        metrics.artifact_count = Some(artifact_count);

        Ok((outcome.outputs, metrics))
    }
}

fn artifact_store_err(_e: StoreError) -> ExecutorError {
    ExecutorError::Io(std::io::Error::new(std::io::ErrorKind::Other, "artifact row insert failed"))
}

struct FeedProgress {
    store: Store,
    broadcaster: Broadcaster,
    execution_id: String,
    proposal_id: String,
    mission_id: Option<String>,
}

#[async_trait]
impl ProgressSink for FeedProgress {
    async fn emit(&self, kind: &str, payload: Value) {
        let line = json!({ "ts": now_iso(), "stage": kind, "payload": payload }).to_string();
        let _ = self.store.append_log_line(self.execution_id.clone(), line).await;
        self.broadcaster
            .publish(FeedEvent::new(
                "execution_log",
                json!({
                    "execution_id": self.execution_id,
                    "proposal_id": self.proposal_id,
                    "mission_id": self.mission_id,
                    "stage": kind,
                    "payload": payload,
                }),
            ))
            .await;
    }
}

/// Applies the terminal transition for `execution_id`/its proposal, unless
/// the execution is already in a terminal state — making direct cancellation
/// and the task's own finalisation safely idempotent against each other.
async fn finalize_execution(
    store: &Store,
    broadcaster: &Broadcaster,
    execution_id: &str,
    proposal_id: &str,
    mission_id: Option<&str>,
    outcome: FinishOutcome,
) -> Result<(), StoreError> {
    if let Some(existing) = store.get_execution(execution_id.to_string()).await? {
        if existing.status.is_terminal() {
            return Ok(());
        }
    }

    let now = now_iso();
    let (exec_status, proposal_status, event_kind) = match &outcome {
        FinishOutcome::Succeeded { .. } => {
            (ExecutionStatus::Succeeded, ProposalStatus::Executed, "execution_finished")
        }
        FinishOutcome::Failed { .. } => (ExecutionStatus::Failed, ProposalStatus::Failed, "execution_failed"),
        FinishOutcome::Cancelled => (ExecutionStatus::Cancelled, ProposalStatus::Cancelled, "execution_cancelled"),
    };
    let error = match &outcome {
        FinishOutcome::Failed { error } => Some(error.clone()),
        _ => None,
    };

    if let FinishOutcome::Succeeded { outputs, metrics } = &outcome {
        store
            .update_execution_outputs(execution_id.to_string(), outputs.clone(), metrics.clone())
            .await?;
    }
    store
        .update_execution_status(execution_id.to_string(), exec_status, Some(now.clone()), error.clone())
        .await?;

    let proposal_timestamp_column = match proposal_status {
        ProposalStatus::Executed => Some("executed_at"),
        _ => None,
    };
    store
        .update_proposal_status(proposal_id.to_string(), proposal_status, proposal_timestamp_column, now)
        .await?;

    record_event(
        store,
        mission_id.map(str::to_string),
        Some(proposal_id.to_string()),
        Some(execution_id.to_string()),
        event_kind,
        json!({ "error": error }),
    )
    .await?;
    broadcaster
        .publish(FeedEvent::new(
            event_kind,
            json!({ "execution_id": execution_id, "proposal_id": proposal_id, "error": error }),
        ))
        .await;

    Ok(())
}

async fn write_file(dir: PathBuf, path: PathBuf, bytes: Vec<u8>) -> Result<(), std::io::Error> {
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dir)?;
        std::fs::write(&path, &bytes)
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulz_core::EngineConfig;
    use pulz_execution::CancellationRegistry;
    use pulz_types::{
        AuthorityMode, ContactMethod, ExecutionMode, ProposalData, ProposalStatus,
    };

    async fn test_handle() -> (MissionEngineHandle, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("engine.sqlite3")).await.unwrap();
        let mut config = EngineConfig::from_env();
        config.data_dir = dir.path().to_path_buf();
        let broadcaster = Broadcaster::new();
        let cancellations = CancellationRegistry::new();
        let state = crate::MissionStateHandle::new();
        let engine = MissionEngine::new(store, broadcaster, config, cancellations, state);
        (MissionEngineHandle::new(engine), dir)
    }

    fn sample_proposal(id: &str, status: ProposalStatus, mode: ExecutionMode) -> Proposal {
        let now = "2026-01-01T00:00:00Z".to_string();
        Proposal {
            id: id.to_string(),
            signal_id: "sig-1".to_string(),
            status,
            created_at: now.clone(),
            updated_at: now,
            approved_at: None,
            executing_at: None,
            executed_at: None,
            execution_mode: mode,
            mission_id: None,
            estimated_revenue_cents: None,
            realized_revenue_cents: None,
            data: ProposalData {
                problem_summary: "Need a resume template".to_string(),
                solution_options: vec!["MVP".to_string()],
                suggested_price_range: "$600 - $1,500".to_string(),
                estimated_build_time_minutes: 240,
                message_template: "Hi".to_string(),
                contact_method: ContactMethod {
                    channel: "reddit".to_string(),
                    handle: None,
                    author: None,
                    permalink: None,
                    url: None,
                    link: None,
                },
            },
        }
    }

    #[tokio::test]
    async fn approve_auto_after_approval_enqueues_html_execution() {
        let (handle, _dir) = test_handle().await;
        let proposal = sample_proposal("p-1", ProposalStatus::Queued, ExecutionMode::AutoAfterApproval);
        handle.store().insert_proposal(proposal).await.unwrap();

        let outcome = handle.approve("p-1".to_string()).await.unwrap();
        assert!(outcome.execution_id.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let proposal = handle.store().get_proposal("p-1".to_string()).await.unwrap().unwrap();
        assert_eq!(proposal.status, ProposalStatus::Executed);

        let execution = handle
            .store()
            .get_execution(outcome.execution_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Succeeded);
    }

    #[tokio::test]
    async fn approve_rejects_non_queued_or_draft_proposal() {
        let (handle, _dir) = test_handle().await;
        let proposal = sample_proposal("p-2", ProposalStatus::Approved, ExecutionMode::Manual);
        handle.store().insert_proposal(proposal).await.unwrap();

        let err = handle.approve("p-2".to_string()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition));
    }

    #[tokio::test]
    async fn reject_is_unconditional() {
        let (handle, _dir) = test_handle().await;
        let proposal = sample_proposal("p-3", ProposalStatus::Draft, ExecutionMode::Manual);
        handle.store().insert_proposal(proposal).await.unwrap();

        handle.reject("p-3".to_string()).await.unwrap();
        let proposal = handle.store().get_proposal("p-3".to_string()).await.unwrap().unwrap();
        assert_eq!(proposal.status, ProposalStatus::Cancelled);
    }

    #[tokio::test]
    async fn execute_rejects_unapproved_proposal_without_rerun() {
        let (handle, _dir) = test_handle().await;
        let proposal = sample_proposal("p-4", ProposalStatus::Draft, ExecutionMode::Manual);
        handle.store().insert_proposal(proposal).await.unwrap();

        let err = handle.execute("p-4".to_string(), "html", false).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition));
    }

    #[tokio::test]
    async fn execute_rejects_invalid_lane() {
        let (handle, _dir) = test_handle().await;
        let proposal = sample_proposal("p-5", ProposalStatus::Approved, ExecutionMode::Manual);
        handle.store().insert_proposal(proposal).await.unwrap();

        let err = handle.execute("p-5".to_string(), "not-a-lane", false).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidLane));
    }

    #[tokio::test]
    async fn cancel_unknown_execution_is_not_found() {
        let (handle, _dir) = test_handle().await;
        let err = handle.cancel_execution("missing".to_string()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ExecutionNotFound));
    }

    #[test]
    fn authority_mode_default_is_auto_draft_queue() {
        assert_eq!(AuthorityMode::default(), AuthorityMode::AutoDraftQueue);
    }
}
