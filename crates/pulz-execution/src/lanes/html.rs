use async_trait::async_trait;
use pulz_types::{ArtifactKind, ExecutionMetrics, ExecutionPlan, ExecutorArtifact, ExecutorOutcome, Lane, Proposal};
use serde_json::json;

use crate::lanes::esc;
use crate::{ExecutionContext, Executor, ExecutorError, ProgressSink};

const STYLESHEET: &str = "body { font-family: sans-serif; max-width: 720px; margin: 2rem auto; \
line-height: 1.5; color: #1a1a1a; }\nh1, h2 { color: #0b3d91; }\n\
ul { padding-left: 1.25rem; }\n.price { font-weight: bold; }\n";

pub struct HtmlExecutor;

#[async_trait]
impl Executor for HtmlExecutor {
    fn lane(&self) -> Lane {
        Lane::Html
    }

    async fn plan(
        &self,
        _proposal: &Proposal,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutionPlan, ExecutorError> {
        Ok(ExecutionPlan {
            estimated_tokens: 0,
            estimated_seconds: 0.5,
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
        emit.emit("lane_started", json!({ "lane": "html" })).await;

        let options: String = proposal
            .data
            .solution_options
            .iter()
            .map(|o| format!("<li>{}</li>", esc(o)))
            .collect();

        let html = format!(
            "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Proposal</title>\n<link rel=\"stylesheet\" href=\"styles.css\">\n</head>\n<body>\n\
             <h1>Proposal</h1>\n<h2>Problem</h2>\n<p>{}</p>\n<h2>Solution options</h2>\n<ul>{}</ul>\n\
             <p class=\"price\">Suggested price range: {}</p>\n\
             <p>Estimated build time: {} minutes</p>\n\
             <h2>Message template</h2>\n<p>{}</p>\n</body>\n</html>\n",
            esc(&proposal.data.problem_summary),
            options,
            esc(&proposal.data.suggested_price_range),
            proposal.data.estimated_build_time_minutes,
            esc(&proposal.data.message_template),
        );

        ctx.check_cancelled()?;
        emit.emit("lane_progress", json!({ "lane": "html", "file": "index.html" })).await;

        let outcome = ExecutorOutcome {
            outputs: json!({ "files": ["index.html", "styles.css"] }),
            artifacts: vec![
                ExecutorArtifact {
                    filename: "index.html".to_string(),
                    kind: ArtifactKind::Html,
                    text: Some(html.clone()),
                    bytes: html.into_bytes(),
                },
                ExecutorArtifact {
                    filename: "styles.css".to_string(),
                    kind: ArtifactKind::Html,
                    text: Some(STYLESHEET.to_string()),
                    bytes: STYLESHEET.as_bytes().to_vec(),
                },
            ],
            metrics: ExecutionMetrics {
                artifact_count: Some(2),
                ..Default::default()
            },
        };

        emit.emit("lane_finished", json!({ "lane": "html" })).await;
        Ok(outcome)
    }
}
