use async_trait::async_trait;
use pulz_types::{ArtifactKind, ExecutionMetrics, ExecutionPlan, ExecutorArtifact, ExecutorOutcome, Lane, Proposal};
use serde_json::json;

use crate::lanes::{render_markdown_body, render_text_body};
use crate::pdf14::write_pdf;
use crate::{ExecutionContext, Executor, ExecutorError, ProgressSink};

pub struct DocExecutor;

#[async_trait]
impl Executor for DocExecutor {
    fn lane(&self) -> Lane {
        Lane::Doc
    }

    async fn plan(
        &self,
        _proposal: &Proposal,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutionPlan, ExecutorError> {
        Ok(ExecutionPlan {
            estimated_tokens: 0,
            estimated_seconds: 1.5,
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
        emit.emit("lane_started", json!({ "lane": "doc" })).await;

        let markdown = render_markdown_body(proposal);
        let text_body = render_text_body(proposal);

        ctx.check_cancelled()?;
        emit.emit("lane_progress", json!({ "lane": "doc", "file": "document.md" })).await;
        let pdf_bytes = write_pdf(&text_body);
        emit.emit("lane_progress", json!({ "lane": "doc", "file": "document.pdf" })).await;

        let outcome = ExecutorOutcome {
            outputs: json!({ "files": ["document.md", "document.pdf"] }),
            artifacts: vec![
                ExecutorArtifact {
                    filename: "document.md".to_string(),
                    kind: ArtifactKind::Doc,
                    text: Some(markdown.clone()),
                    bytes: markdown.into_bytes(),
                },
                ExecutorArtifact {
                    filename: "document.pdf".to_string(),
                    kind: ArtifactKind::Pdf,
                    text: None,
                    bytes: pdf_bytes,
                },
            ],
            metrics: ExecutionMetrics {
                artifact_count: Some(2),
                ..Default::default()
            },
        };

        emit.emit("lane_finished", json!({ "lane": "doc" })).await;
        Ok(outcome)
    }
}
