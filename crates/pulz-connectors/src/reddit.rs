use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pulz_types::{Signal, SignalStatus};
use serde_json::Value;

use crate::{truncate_excerpt, Connector, ConnectorError, USER_AGENT};

/// Polls a Reddit-like JSON listing endpoint (`/r/<subreddit>/new.json`). Grounded
/// on the original `RedditPublicConnector`: conditional-fetch caching, 15s
/// timeout, `data.children[].data` enumeration.
pub struct RedditConnector {
    source: String,
    listing_url: String,
    client: reqwest::Client,
    etag: Option<String>,
    last_modified: Option<String>,
}

impl RedditConnector {
    pub fn new(subreddit: &str, limit: u32) -> Self {
        Self {
            source: format!("reddit:r/{subreddit}"),
            listing_url: format!(
                "https://www.reddit.com/r/{subreddit}/new.json?limit={limit}"
            ),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .user_agent(USER_AGENT)
                .build()
                .expect("reqwest client builds"),
            etag: None,
            last_modified: None,
        }
    }
}

#[async_trait]
impl Connector for RedditConnector {
    fn source_name(&self) -> &str {
        &self.source
    }

    async fn fetch_signals(&mut self) -> Result<Vec<Signal>, ConnectorError> {
        let mut request = self.client.get(&self.listing_url);
        if let Some(etag) = &self.etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &self.last_modified {
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(Vec::new());
        }

        self.etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let payload: Value = response.json().await?;
        let children = payload
            .get("data")
            .and_then(|d| d.get("children"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let now_iso = pulz_core::now_iso();
        let mut signals = Vec::with_capacity(children.len());
        for child in children {
            let Some(data) = child.get("data").cloned() else {
                continue;
            };
            let id = data.get("id").and_then(Value::as_str).unwrap_or("").to_string();
            if id.is_empty() {
                continue;
            }
            let permalink = data.get("permalink").and_then(Value::as_str).unwrap_or("");
            let url = data
                .get("url")
                .and_then(Value::as_str)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("https://www.reddit.com{permalink}"));
            let title = data.get("title").and_then(Value::as_str).unwrap_or("").trim().to_string();
            let body = data
                .get("selftext")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim()
                .to_string();
            let author = data
                .get("author")
                .and_then(Value::as_str)
                .map(str::to_string)
                .filter(|a| !a.is_empty());
            let created_at = data
                .get("created_utc")
                .and_then(Value::as_f64)
                .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
                .map(pulz_core::to_iso)
                .unwrap_or_else(|| now_iso.clone());

            signals.push(Signal {
                id,
                source: self.source.clone(),
                url,
                title,
                body_excerpt: truncate_excerpt(&body),
                author: author.clone(),
                created_at,
                raw: data,
                contact_hint: author,
                scored: None,
                proposal_id: None,
                status: SignalStatus::Queued,
                inserted_at: now_iso.clone(),
            });
        }
        Ok(signals)
    }
}
