//! Subscription and protocol parsing
//!
//! This module provides functionality for:
//! - Detecting subscription formats (Clash YAML, JSON, Base64, raw URI lines)
//! - Decoding content (Base64 variants, legacy code pages)
//! - Parsing share-link URIs into [`ProxyRecord`]s
//! - Collecting per-item failures into a [`ParseReport`]

pub mod base64;
pub mod detection;
pub mod protocols;
pub mod structured;
pub mod text;

use tracing::{debug, warn};

use crate::config::proxy::ProxyRecord;

use self::base64::decode_base64_text;
use self::detection::{SubscriptionFormat, detect_format, is_proxy_object_line};
use self::protocols::ProtocolRegistry;
use self::text::preview;

/// Characters of an offending input kept in failure reports and logs
const FAILURE_PREVIEW_CHARS: usize = 30;

// ============================================================================
// Parse Report
// ============================================================================

/// One input that could not be turned into a record
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    /// Truncated preview of the input
    pub input: String,
    pub reason: String,
}

/// Records decoded from one payload, plus everything that was skipped
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub records: Vec<ProxyRecord>,
    pub failures: Vec<DecodeFailure>,
}

impl ParseReport {
    pub fn push_record(&mut self, record: ProxyRecord) {
        self.records.push(record);
    }

    /// Record a skipped input, logging it with a truncated preview
    pub fn push_failure(&mut self, input: &str, reason: impl Into<String>) {
        let failure = DecodeFailure {
            input: preview(input, FAILURE_PREVIEW_CHARS),
            reason: reason.into(),
        };
        warn!("Skipping {:?}: {}", failure.input, failure.reason);
        self.failures.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Unified Subscription Parsing
// ============================================================================

/// Parses subscription content with automatic format detection.
///
/// Never fails: malformed items land in [`ParseReport::failures`] and an
/// undecodable payload yields an empty report.
pub fn parse_subscription(content: &str, registry: &ProtocolRegistry) -> ParseReport {
    parse_with_depth(content, registry, 0)
}

/// Base64 payloads are unwrapped at most once
const MAX_UNWRAP_DEPTH: u8 = 1;

fn parse_with_depth(content: &str, registry: &ProtocolRegistry, depth: u8) -> ParseReport {
    let format = detect_format(content);
    debug!("Parsing {} subscription (depth {})", format, depth);

    let report = match format {
        SubscriptionFormat::Json => match structured::extract_json(content) {
            Ok(Some(report)) => report,
            Ok(None) => parse_lines(content, registry),
            Err(e) => failed(content, e),
        },
        SubscriptionFormat::ClashYaml => match structured::extract_yaml(content) {
            Ok(Some(report)) => report,
            Ok(None) => {
                warn!("Clash YAML subscription has no proxies list, reading it as lines");
                parse_lines(content, registry)
            }
            Err(e) => failed(content, e),
        },
        SubscriptionFormat::RawLines => parse_lines(content, registry),
        SubscriptionFormat::Base64 if depth >= MAX_UNWRAP_DEPTH => parse_lines(content, registry),
        SubscriptionFormat::Base64 => match decode_base64_text(content) {
            Ok(decoded) => {
                debug!("Base64 decoded content length: {} bytes", decoded.len());
                parse_with_depth(&decoded, registry, depth + 1)
            }
            Err(e) if content.contains("://") => {
                debug!("Base64 decoding failed ({}), reading content as lines", e);
                parse_lines(content, registry)
            }
            Err(e) => {
                debug!("Content is not decodable, no records: {}", e);
                ParseReport::default()
            }
        },
    };

    debug!(
        "{} parsing complete: {} records, {} failures",
        format,
        report.records.len(),
        report.failures.len()
    );
    report
}

/// Parses one share link or JSON proxy object per line.
///
/// Blank lines and `#` comments are skipped.
pub fn parse_lines(content: &str, registry: &ProtocolRegistry) -> ParseReport {
    let mut report = ParseReport::default();

    for line in content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
    {
        let result = if is_proxy_object_line(line) {
            structured::record_from_json_line(line)
        } else {
            registry.parse_uri(line)
        };

        match result {
            Ok(record) => report.push_record(record),
            Err(e) => report.push_failure(line, format!("{:#}", e)),
        }
    }

    report
}

fn failed(content: &str, error: anyhow::Error) -> ParseReport {
    let mut report = ParseReport::default();
    report.push_failure(content, format!("{:#}", error));
    report
}
