use crate::{Connector, RedditConnector, RssConnector};

/// Parameters needed to construct a [`Connector`] for one catalogue entry.
#[derive(Debug, Clone, Copy)]
pub enum SourceConfig {
    Reddit { subreddit: &'static str, limit: u32 },
    Rss { feed_url: &'static str },
}

/// Static source name -> connector kind/parameters table, matching
/// `pulz_backend.py`'s `SOURCE_CONFIG`. A name absent from this table is an
/// unknown source and is skipped silently by the mission engine (`spec` §4.5).
pub const SOURCE_CATALOGUE: &[(&str, SourceConfig)] = &[
    (
        "reddit_smallbusiness",
        SourceConfig::Reddit {
            subreddit: "smallbusiness",
            limit: 20,
        },
    ),
    (
        "reddit_entrepreneur",
        SourceConfig::Reddit {
            subreddit: "entrepreneur",
            limit: 20,
        },
    ),
    (
        "rss_forhire",
        SourceConfig::Rss {
            feed_url: "https://www.reddit.com/r/forhire/.rss",
        },
    ),
];

/// Resolves a catalogue source name into a boxed [`Connector`]. Returns `None`
/// for unknown names rather than erroring, so the mission loop can skip them.
pub fn resolve_connector(source: &str) -> Option<Box<dyn Connector>> {
    let (_, config) = SOURCE_CATALOGUE.iter().find(|(name, _)| *name == source)?;
    Some(match *config {
        SourceConfig::Reddit { subreddit, limit } => {
            Box::new(RedditConnector::new(subreddit, limit))
        }
        SourceConfig::Rss { feed_url } => Box::new(RssConnector::new(source, feed_url)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_source() {
        assert!(resolve_connector("reddit_smallbusiness").is_some());
        assert!(resolve_connector("rss_forhire").is_some());
    }

    #[test]
    fn unknown_source_resolves_to_none() {
        assert!(resolve_connector("not_a_real_source").is_none());
    }
}
