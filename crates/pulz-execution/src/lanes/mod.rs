pub mod doc;
pub mod html;
pub mod pdf;
pub mod site;

use pulz_types::Proposal;

/// Plain-text body shared by the `pdf` and `doc` lanes: problem summary,
/// numbered solution options, price range, build time, and the message
/// template — the same fields the `html` lane renders as markup.
pub(crate) fn render_text_body(proposal: &Proposal) -> String {
    let mut body = String::new();
    body.push_str(&format!("Problem\n{}\n\n", proposal.data.problem_summary));
    body.push_str("Solution options\n");
    for (i, option) in proposal.data.solution_options.iter().enumerate() {
        body.push_str(&format!("{}. {option}\n", i + 1));
    }
    body.push('\n');
    body.push_str(&format!(
        "Suggested price range: {}\n",
        proposal.data.suggested_price_range
    ));
    body.push_str(&format!(
        "Estimated build time: {} minutes\n\n",
        proposal.data.estimated_build_time_minutes
    ));
    body.push_str("Message template\n");
    body.push_str(&proposal.data.message_template);
    body.push('\n');
    body
}

/// Markdown rendering of the same fields, for the `doc` lane's `document.md`.
pub(crate) fn render_markdown_body(proposal: &Proposal) -> String {
    let mut body = String::new();
    body.push_str(&format!("# Proposal\n\n## Problem\n\n{}\n\n", proposal.data.problem_summary));
    body.push_str("## Solution options\n\n");
    for option in &proposal.data.solution_options {
        body.push_str(&format!("- {option}\n"));
    }
    body.push_str(&format!(
        "\n**Suggested price range:** {}\n\n",
        proposal.data.suggested_price_range
    ));
    body.push_str(&format!(
        "**Estimated build time:** {} minutes\n\n",
        proposal.data.estimated_build_time_minutes
    ));
    body.push_str("## Message template\n\n");
    body.push_str(&proposal.data.message_template);
    body.push('\n');
    body
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub(crate) use escape_html as esc;
