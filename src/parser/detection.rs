//! Subscription format detection
//!
//! Classifies an arbitrary subscription payload before any protocol-specific
//! decoding. Checks run in a fixed order: JSON, Clash YAML, raw URI lines,
//! Base64. Anything unrecognised is treated as Base64 and left to the decoder
//! to reject.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::base64::decode_base64;
use super::protocols::KNOWN_SCHEMES;
use super::text::preview;

/// Root keys of a Clash document
const CLASH_ROOT_KEYS: &[&str] = &[
    "proxies:",
    "proxy-groups:",
    "rules:",
    "port:",
    "mixed-port:",
    "socks-port:",
    "allow-lan:",
];

/// How far into the content the YAML root-key check looks
const YAML_PROBE_CHARS: usize = 500;

/// Length of the prefix decoded when probing Base64 content
const BASE64_SAMPLE_CHARS: usize = 64;

static BASE64_ALPHABET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9+/_-]+={0,2}$").unwrap_or_else(|e| panic!("invalid regex: {}", e))
});

// ============================================================================
// Subscription Format
// ============================================================================

/// Detected subscription content format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionFormat {
    /// Clash YAML document with a `proxies` list
    ClashYaml,
    /// JSON object with `proxies`, or a top-level array of proxies
    Json,
    /// Base64 blob wrapping any other format
    Base64,
    /// One share link per line
    RawLines,
}

impl std::fmt::Display for SubscriptionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionFormat::ClashYaml => write!(f, "Clash YAML"),
            SubscriptionFormat::Json => write!(f, "JSON"),
            SubscriptionFormat::Base64 => write!(f, "Base64"),
            SubscriptionFormat::RawLines => write!(f, "Raw URI lines"),
        }
    }
}

/// Detects the format of subscription content
pub fn detect_format(content: &str) -> SubscriptionFormat {
    let trimmed = content.trim();
    debug!(
        "Detecting subscription format, content length: {} bytes, preview: {:?}",
        content.len(),
        preview(trimmed, 30)
    );

    let format = if is_json(trimmed) {
        SubscriptionFormat::Json
    } else if is_clash_yaml(trimmed) {
        SubscriptionFormat::ClashYaml
    } else if has_uri_lines(trimmed) {
        SubscriptionFormat::RawLines
    } else if is_base64_content(trimmed) {
        SubscriptionFormat::Base64
    } else {
        debug!("No format matched, assuming Base64");
        SubscriptionFormat::Base64
    };

    debug!("Detected subscription format: {}", format);
    format
}

/// JSON object holding `proxies`, or a JSON array
pub fn is_json(content: &str) -> bool {
    let trimmed = content.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return false;
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => map.contains_key("proxies"),
        Ok(serde_json::Value::Array(_)) => true,
        _ => false,
    }
}

/// An unindented Clash root key near the top of the content
pub fn is_clash_yaml(content: &str) -> bool {
    let head: String = content.chars().take(YAML_PROBE_CHARS).collect();
    head.lines()
        .filter(|line| !line.starts_with([' ', '\t']))
        .any(|line| CLASH_ROOT_KEYS.iter().any(|key| line.starts_with(key)))
}

/// At least one line is a share link with a known scheme, or a JSON proxy object
pub fn has_uri_lines(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .any(|line| is_proxy_uri(line) || is_proxy_object_line(line))
}

/// Checks if a string starts with a known share-link scheme, ignoring case
pub fn is_proxy_uri(s: &str) -> bool {
    match s.split_once("://") {
        Some((scheme, _)) => KNOWN_SCHEMES
            .iter()
            .any(|known| scheme.eq_ignore_ascii_case(known)),
        None => false,
    }
}

/// A single-line JSON object carrying `type` and `server`
pub fn is_proxy_object_line(line: &str) -> bool {
    if !(line.starts_with('{') && line.ends_with('}')) {
        return false;
    }
    matches!(
        serde_json::from_str::<serde_json::Value>(line),
        Ok(serde_json::Value::Object(map)) if map.contains_key("type") && map.contains_key("server")
    )
}

/// Base64 alphabet, length a multiple of 4, and a decoded prefix that looks
/// like share links or structured content
pub fn is_base64_content(content: &str) -> bool {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() || cleaned.len() % 4 != 0 {
        return false;
    }
    if !BASE64_ALPHABET.is_match(&cleaned) {
        return false;
    }

    let sample: String = cleaned.chars().take(BASE64_SAMPLE_CHARS).collect();
    let sample = sample.trim_end_matches('=');
    match decode_base64(sample) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            text.contains("://") && is_proxy_uri(text.trim_start())
                || text.contains('{')
                || text.contains("proxies:")
        }
        Err(_) => false,
    }
}
