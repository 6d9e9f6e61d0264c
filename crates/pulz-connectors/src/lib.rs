mod catalogue;
mod reddit;
mod rss;

pub use catalogue::{resolve_connector, SourceConfig, SOURCE_CATALOGUE};
pub use reddit::RedditConnector;
pub use rss::RssConnector;

use async_trait::async_trait;
use pulz_types::Signal;
use thiserror::Error;

pub const USER_AGENT: &str = "PulZOpportunityEngine/1.0 (+https://pulz.local)";

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed parse error: {0}")]
    Parse(String),
}

/// A signal source poller. Each connector instance remembers the last observed
/// `ETag`/`Last-Modified` validators so repeated polls are conditional fetches.
#[async_trait]
pub trait Connector: Send + Sync {
    fn source_name(&self) -> &str;
    async fn fetch_signals(&mut self) -> Result<Vec<Signal>, ConnectorError>;
}

pub(crate) fn truncate_excerpt(body: &str) -> String {
    body.chars().take(400).collect()
}
