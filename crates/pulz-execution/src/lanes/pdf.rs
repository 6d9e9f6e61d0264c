use async_trait::async_trait;
use pulz_types::{ArtifactKind, ExecutionMetrics, ExecutionPlan, ExecutorArtifact, ExecutorOutcome, Lane, Proposal};
use serde_json::json;

use crate::lanes::render_text_body;
use crate::pdf14::write_pdf;
use crate::{ExecutionContext, Executor, ExecutorError, ProgressSink};

pub struct PdfExecutor;

#[async_trait]
impl Executor for PdfExecutor {
    fn lane(&self) -> Lane {
        Lane::Pdf
    }

    async fn plan(
        &self,
        _proposal: &Proposal,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutionPlan, ExecutorError> {
        Ok(ExecutionPlan {
            estimated_tokens: 0,
            estimated_seconds: 1.0,
        })
    }

    async fn run(
        &self,
        _execution_id: &str,
        proposal: &Proposal,
        ctx: &ExecutionContext,
        emit: &dyn ProgressSink,
    ) -> Result<ExecutorOutcome, ExecutorError> {
        ctx.check_cancelled()?;
        emit.emit("lane_started", json!({ "lane": "pdf" })).await;

        let body = render_text_body(proposal);
        let bytes = write_pdf(&body);

        ctx.check_cancelled()?;
        emit.emit("lane_progress", json!({ "lane": "pdf", "file": "proposal.pdf" })).await;

        let outcome = ExecutorOutcome {
            outputs: json!({ "files": ["proposal.pdf"] }),
            artifacts: vec![ExecutorArtifact {
                filename: "proposal.pdf".to_string(),
                kind: ArtifactKind::Pdf,
                text: None,
                bytes,
            }],
            metrics: ExecutionMetrics {
                artifact_count: Some(1),
                ..Default::default()
            },
        };

        emit.emit("lane_finished", json!({ "lane": "pdf" })).await;
        Ok(outcome)
    }
}
