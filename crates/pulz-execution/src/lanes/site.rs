use std::io::{Cursor, Write};

use async_trait::async_trait;
use pulz_types::{ArtifactKind, ExecutionMetrics, ExecutionPlan, ExecutorArtifact, ExecutorOutcome, Lane, Proposal};
use serde_json::json;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::lanes::esc;
use crate::{ExecutionContext, Executor, ExecutorError, ProgressSink};

pub struct SiteExecutor;

#[async_trait]
impl Executor for SiteExecutor {
    fn lane(&self) -> Lane {
        Lane::Site
    }

    async fn plan(
        &self,
        _proposal: &Proposal,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutionPlan, ExecutorError> {
        Ok(ExecutionPlan {
            estimated_tokens: 0,
            estimated_seconds: 2.0,
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
        emit.emit("lane_started", json!({ "lane": "site" })).await;

        let index_html = page(
            "Home",
            &format!(
                "<h2>What we can build</h2><ul>{}</ul>",
                proposal
                    .data
                    .solution_options
                    .iter()
                    .map(|o| format!("<li>{}</li>", esc(o)))
                    .collect::<String>()
            ),
        );
        let about_html = page(
            "About",
            &format!("<h2>The problem</h2><p>{}</p>", esc(&proposal.data.problem_summary)),
        );
        let contact_html = page(
            "Contact",
            &format!("<h2>Get in touch</h2><p>{}</p>", esc(&proposal.data.message_template)),
        );

        ctx.check_cancelled()?;
        emit.emit("lane_progress", json!({ "lane": "site", "file": "pages" })).await;

        let pages = [
            ("index.html", &index_html),
            ("about.html", &about_html),
            ("contact.html", &contact_html),
        ];
        let zip_bytes = build_zip(&pages)?;

        ctx.check_cancelled()?;
        emit.emit("lane_progress", json!({ "lane": "site", "file": "site.zip" })).await;

        let mut artifacts: Vec<ExecutorArtifact> = pages
            .iter()
            .map(|(name, body)| ExecutorArtifact {
                filename: name.to_string(),
                kind: ArtifactKind::Html,
                text: Some((*body).clone()),
                bytes: body.clone().into_bytes(),
            })
            .collect();
        artifacts.push(ExecutorArtifact {
            filename: "site.zip".to_string(),
            kind: ArtifactKind::Zip,
            text: None,
            bytes: zip_bytes,
        });

        let outcome = ExecutorOutcome {
            outputs: json!({ "files": ["index.html", "about.html", "contact.html", "site.zip"] }),
            metrics: ExecutionMetrics {
                artifact_count: Some(artifacts.len() as u32),
                ..Default::default()
            },
            artifacts,
        };

        emit.emit("lane_finished", json!({ "lane": "site" })).await;
        Ok(outcome)
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n{body}\n</body>\n</html>\n"
    )
}

/// Bundles the three pages flat into a zip archive with no directory prefix.
fn build_zip(pages: &[(&str, &String)]) -> Result<Vec<u8>, ExecutorError> {
    let cursor = Cursor::new(Vec::new());
    let mut writer = ZipWriter::new(cursor);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, body) in pages {
        writer.start_file(*name, options)?;
        writer.write_all(body.as_bytes())?;
    }
    let cursor = writer.finish()?;

    Ok(cursor.into_inner())
}
