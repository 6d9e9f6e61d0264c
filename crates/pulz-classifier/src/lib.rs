//! Heuristic opportunity scoring with optional LLM refinement. Grounded 1:1 on
//! `_heuristic_score`/`_categorize`/`_risk_flags`/`_estimate`/`_ollama_classify`
//! in `original_source/openwebui-patch/pulz_backend.py`.

use pulz_providers::OllamaClient;
use pulz_types::{Category, Feasibility, RecommendedAction, RiskFlag, Scoring};

/// Fixed, case-insensitive keyword list driving the heuristic score (`spec`
/// Glossary). Order is insignificant; the score is a plain occurrence count.
pub const KEYWORDS: &[&str] = &[
    "need",
    "looking for",
    "is there a tool",
    "generator",
    "template",
    "lease",
    "resume",
    "pdf",
    "proposal",
    "automation",
    "integrate",
    "web app",
    "tool",
];

const RISK_LEGAL: &[&str] = &["legal", "law", "attorney", "contract"];
const RISK_MEDICAL: &[&str] = &["medical", "health", "clinic", "patient"];
const RISK_FINANCIAL: &[&str] = &["loan", "investment", "tax", "accounting"];

const DOC_GENERATOR_KEYWORDS: &[&str] = &["template", "pdf", "resume", "lease", "generator"];
const AUTOMATION_KEYWORDS: &[&str] = &["automation", "integrate", "zapier", "api"];
const MICRO_SAAS_KEYWORDS: &[&str] = &["app", "web", "saas", "tool"];

/// Token usage observed (or estimated) while scoring one signal, for the
/// caller to fold into a `tokens_used` telemetry event (`spec` §4.3 step 7).
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub tokens: u64,
    pub provider: String,
}

#[derive(Debug, Clone)]
pub struct ClassifyOutcome {
    pub scoring: Scoring,
    pub token_usage: TokenUsage,
    /// True when the LLM successfully refined the heuristic result.
    pub llm_assisted: bool,
}

pub fn heuristic_score(text: &str) -> u32 {
    let lower = text.to_lowercase();
    KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count() as u32
}

pub fn categorize(text: &str) -> Category {
    let lower = text.to_lowercase();
    if DOC_GENERATOR_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Category::DocGenerator
    } else if AUTOMATION_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Category::Automation
    } else if MICRO_SAAS_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Category::MicroSaas
    } else {
        Category::Ignore
    }
}

pub fn risk_flags(text: &str) -> Vec<RiskFlag> {
    let lower = text.to_lowercase();
    let mut flags = Vec::new();
    if RISK_LEGAL.iter().any(|kw| lower.contains(kw)) {
        flags.push(RiskFlag::Legal);
    }
    if RISK_MEDICAL.iter().any(|kw| lower.contains(kw)) {
        flags.push(RiskFlag::Medical);
    }
    if RISK_FINANCIAL.iter().any(|kw| lower.contains(kw)) {
        flags.push(RiskFlag::Financial);
    }
    flags
}

struct Estimate {
    feasibility: Feasibility,
    estimated_build_time_minutes: u32,
    suggested_price_range: String,
    risk_flags: Vec<RiskFlag>,
}

fn estimate(text: &str, category: Category) -> Estimate {
    let score = heuristic_score(text);
    let flags = risk_flags(text);
    let (base, price) = match category {
        Category::DocGenerator => (240, "$600 - $1,500"),
        Category::Automation => (360, "$900 - $2,500"),
        Category::MicroSaas => (480, "$1,200 - $3,500"),
        Category::Ignore => (180, "$400 - $900"),
    };
    // Mirrors `_estimate`'s three-step override order: base on score/risk, then
    // force LOW for score<=1, then risk flags win over everything (so a risky
    // low-score signal still reads MED, never LOW).
    let mut feasibility = if score >= 2 && flags.is_empty() {
        Feasibility::High
    } else {
        Feasibility::Med
    };
    if score <= 1 {
        feasibility = Feasibility::Low;
    }
    if !flags.is_empty() {
        feasibility = Feasibility::Med;
    }
    Estimate {
        feasibility,
        estimated_build_time_minutes: base + score.saturating_sub(2) * 60,
        suggested_price_range: price.to_string(),
        risk_flags: flags,
    }
}

fn estimated_tokens(text: &str) -> u64 {
    (text.len() as u64 / 4).max(1)
}

/// Runs the heuristic algorithm and, if `llm` is provided, attempts a single
/// refinement call. A missing, slow, or unparseable LLM response silently
/// keeps the heuristic result — never fails the caller (`spec` §4.3 step 7,
/// §7 "Transient I/O").
pub async fn classify(title: &str, body_excerpt: &str, llm: Option<&OllamaClient>) -> ClassifyOutcome {
    let text = format!("{title}\n{body_excerpt}");
    let category = categorize(&text);
    let est = estimate(&text, category);
    let score = heuristic_score(&text);
    let recommended = if score >= 2 && est.risk_flags.is_empty() {
        RecommendedAction::DraftProposal
    } else {
        RecommendedAction::Ignore
    };

    let mut scoring = Scoring {
        category,
        feasibility: est.feasibility,
        estimated_build_time_minutes: est.estimated_build_time_minutes,
        suggested_price_range: est.suggested_price_range,
        risk_flags: est.risk_flags,
        recommended_next_action: recommended,
        rationale: "keyword heuristic".to_string(),
    };

    let mut token_usage = TokenUsage {
        tokens: estimated_tokens(&text),
        provider: "estimate".to_string(),
    };
    let mut llm_assisted = false;

    if let Some(client) = llm {
        if let Ok(response) = client.generate(&build_prompt(&text)).await {
            if let Some(refined) = parse_json_block(&response.response) {
                merge_refinement(&mut scoring, &refined);
                scoring.rationale = "llm_assisted".to_string();
                llm_assisted = true;
                let tokens = response.prompt_eval_count.unwrap_or(0) + response.eval_count.unwrap_or(0);
                token_usage = TokenUsage {
                    tokens: tokens.max(1),
                    provider: "ollama".to_string(),
                };
            }
        }
    }

    if !scoring.risk_flags.is_empty() {
        scoring.recommended_next_action = RecommendedAction::NeedsClarification;
    }

    ClassifyOutcome {
        scoring,
        token_usage,
        llm_assisted,
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        "Classify the following opportunity. Respond ONLY with JSON containing keys: \
         category, feasibility, estimated_build_time_minutes, suggested_price_range, \
         risk_flags, recommended_next_action, rationale. Risk flags must be array of \
         strings.\n\nText: {text}"
    )
}

/// Extracts and parses the first `{...}` JSON object in `text`, matching
/// `_parse_json_block`'s first-`{`-to-last-`}` slice strategy.
fn parse_json_block(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Merges an untrusted LLM JSON object over the heuristic `Scoring`. Unknown
/// or malformed `category`/`feasibility` values are coerced to the nearest
/// enum member or left at the heuristic value — never trusted verbatim
/// (`spec` §9 design note on dynamic classifier results).
fn merge_refinement(scoring: &mut Scoring, refined: &serde_json::Value) {
    if let Some(category) = refined.get("category").and_then(|v| v.as_str()) {
        if let Some(parsed) = coerce_category(category) {
            scoring.category = parsed;
        }
    }
    if let Some(feasibility) = refined.get("feasibility").and_then(|v| v.as_str()) {
        if let Some(parsed) = coerce_feasibility(feasibility) {
            scoring.feasibility = parsed;
        }
    }
    if let Some(minutes) = refined
        .get("estimated_build_time_minutes")
        .and_then(|v| v.as_u64())
    {
        scoring.estimated_build_time_minutes = minutes as u32;
    }
    if let Some(price) = refined.get("suggested_price_range").and_then(|v| v.as_str()) {
        scoring.suggested_price_range = price.to_string();
    }
    if let Some(flags) = refined.get("risk_flags").and_then(|v| v.as_array()) {
        let coerced: Vec<RiskFlag> = flags
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(coerce_risk_flag)
            .collect();
        if !coerced.is_empty() {
            scoring.risk_flags = coerced;
        }
    }
    if let Some(action) = refined
        .get("recommended_next_action")
        .and_then(|v| v.as_str())
    {
        if let Some(parsed) = coerce_action(action) {
            scoring.recommended_next_action = parsed;
        }
    }
    if let Some(rationale) = refined.get("rationale").and_then(|v| v.as_str()) {
        if !rationale.is_empty() {
            scoring.rationale = rationale.to_string();
        }
    }
}

fn coerce_category(raw: &str) -> Option<Category> {
    let lower = raw.to_lowercase();
    if lower.contains("doc") || lower.contains("template") {
        Some(Category::DocGenerator)
    } else if lower.contains("automat") || lower.contains("integrat") {
        Some(Category::Automation)
    } else if lower.contains("saas") || lower.contains("app") || lower.contains("web") {
        Some(Category::MicroSaas)
    } else if lower.contains("ignore") {
        Some(Category::Ignore)
    } else {
        None
    }
}

fn coerce_feasibility(raw: &str) -> Option<Feasibility> {
    match raw.to_uppercase().as_str() {
        "LOW" => Some(Feasibility::Low),
        "MED" | "MEDIUM" => Some(Feasibility::Med),
        "HIGH" => Some(Feasibility::High),
        _ => None,
    }
}

fn coerce_risk_flag(raw: &str) -> Option<RiskFlag> {
    match raw.to_lowercase().as_str() {
        "legal" => Some(RiskFlag::Legal),
        "medical" => Some(RiskFlag::Medical),
        "financial" => Some(RiskFlag::Financial),
        _ => None,
    }
}

fn coerce_action(raw: &str) -> Option<RecommendedAction> {
    let lower = raw.to_lowercase();
    if lower.contains("draft") {
        Some(RecommendedAction::DraftProposal)
    } else if lower.contains("clarif") {
        Some(RecommendedAction::NeedsClarification)
    } else if lower.contains("ignore") {
        Some(RecommendedAction::Ignore)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_score_no_risk_yields_ignore() {
        let outcome = classify("hello world", "just saying hi", None).await;
        assert_eq!(heuristic_score("hello world\njust saying hi"), 0);
        assert_eq!(outcome.scoring.recommended_next_action, RecommendedAction::Ignore);
    }

    #[tokio::test]
    async fn risk_keyword_forces_needs_clarification() {
        let outcome = classify("need a tool", "help with my tax filing, it's urgent", None).await;
        assert!(!outcome.scoring.risk_flags.is_empty());
        assert_eq!(
            outcome.scoring.recommended_next_action,
            RecommendedAction::NeedsClarification
        );
    }

    #[tokio::test]
    async fn strong_match_no_risk_drafts_proposal() {
        let outcome = classify(
            "need a resume template generator",
            "looking for a pdf generator tool",
            None,
        )
        .await;
        assert_eq!(
            outcome.scoring.recommended_next_action,
            RecommendedAction::DraftProposal
        );
        assert_eq!(outcome.scoring.category, Category::DocGenerator);
    }

    #[test]
    fn estimate_minutes_scale_with_score_above_two() {
        let text = "need a web app tool generator automation integrate api zapier";
        let score = heuristic_score(text);
        assert!(score >= 2);
        let est = estimate(text, Category::Automation);
        assert_eq!(
            est.estimated_build_time_minutes,
            360 + score.saturating_sub(2) * 60
        );
    }

    #[test]
    fn parse_json_block_extracts_first_object() {
        let text = "here is json: {\"category\": \"automation\"} trailing text";
        let value = parse_json_block(text).unwrap();
        assert_eq!(value["category"], "automation");
    }

    #[test]
    fn parse_json_block_rejects_garbage() {
        assert!(parse_json_block("no braces here").is_none());
    }
}
