use tracing::info;

use crate::config::proxy::ProxyRecord;
use crate::parser::protocols::ProtocolRegistry;
use crate::parser::{DecodeFailure, ParseReport, parse_lines, parse_subscription};

/// Label of the source holding URIs given directly in the config
pub const LITERAL_SOURCE: &str = "<uris>";

/// Names shown per source in summaries
const SUMMARY_NAMES: usize = 5;

// ============================================================================
// Subscription Source
// ============================================================================

/// One subscription URL and everything decoded from it
#[derive(Clone, Debug, Default)]
pub struct SubscriptionSource {
    pub url: String,

    /// Body as fetched, `None` when every attempt failed
    pub raw_content: Option<String>,

    pub records: Vec<ProxyRecord>,

    pub failures: Vec<DecodeFailure>,
}

impl SubscriptionSource {
    /// Detect and decode a fetched body
    pub fn from_content(url: impl Into<String>, content: String, registry: &ProtocolRegistry) -> Self {
        let report = parse_subscription(&content, registry);
        Self::from_report(url, Some(content), report)
    }

    /// A source that could not be fetched
    pub fn unreachable(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Share-link URIs given directly, one source for all of them
    pub fn literal(uris: &[String], registry: &ProtocolRegistry) -> Self {
        let report = parse_lines(&uris.join("\n"), registry);
        Self::from_report(LITERAL_SOURCE, None, report)
    }

    fn from_report(url: impl Into<String>, raw_content: Option<String>, report: ParseReport) -> Self {
        Self {
            url: url.into(),
            raw_content,
            records: report.records,
            failures: report.failures,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.raw_content.is_some()
    }

    /// `url: N proxies [a, b, c, d, e, ...]`
    pub fn summary(&self) -> String {
        let mut names: Vec<&str> = self
            .records
            .iter()
            .take(SUMMARY_NAMES)
            .map(|r| r.name.as_str())
            .collect();
        if self.records.len() > SUMMARY_NAMES {
            names.push("...");
        }
        format!(
            "{}: {} proxies [{}]",
            self.url,
            self.records.len(),
            names.join(", ")
        )
    }
}

// ============================================================================
// Subscription Session
// ============================================================================

/// Sources of one generation run, in input order.
///
/// Adding a source for a URL that is already present replaces it in place.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionSession {
    sources: Vec<SubscriptionSource>,
}

impl SubscriptionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, source: SubscriptionSource) {
        match self.sources.iter_mut().find(|s| s.url == source.url) {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
    }

    pub fn sources(&self) -> &[SubscriptionSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn total_records(&self) -> usize {
        self.sources.iter().map(|s| s.records.len()).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.sources.iter().map(|s| s.failures.len()).sum()
    }

    pub fn log_summary(&self) {
        for source in &self.sources {
            if source.is_reachable() || source.url == LITERAL_SOURCE {
                info!("{}", source.summary());
            } else {
                info!("{}: unreachable, 0 proxies", source.url);
            }
        }
        info!(
            "{} source(s): {} proxies decoded, {} entries skipped",
            self.sources.len(),
            self.total_records(),
            self.total_failures()
        );
    }

    /// All records in source order
    pub fn into_records(self) -> Vec<ProxyRecord> {
        self.sources.into_iter().flat_map(|s| s.records).collect()
    }
}
