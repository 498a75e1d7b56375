//! Base64 decoding utilities
//!
//! Subscriptions and share links use every Base64 flavour in the wild:
//! standard or URL-safe alphabet, with or without padding, wrapped at
//! arbitrary columns.

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use tracing::trace;

use super::text::decode_bytes;

// ============================================================================
// Base64 Decoding
// ============================================================================

/// Decodes Base64 content, trying each alphabet with and without padding
///
/// Whitespace anywhere in the input is ignored.
pub fn decode_base64(content: &str) -> Result<Vec<u8>> {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let padded = add_base64_padding(&cleaned);

    let attempts: [(&str, &GeneralPurpose, &str); 5] = [
        ("standard", &STANDARD, cleaned.as_str()),
        ("url-safe", &URL_SAFE, cleaned.as_str()),
        ("url-safe unpadded", &URL_SAFE_NO_PAD, cleaned.as_str()),
        ("standard re-padded", &STANDARD, padded.as_str()),
        ("url-safe re-padded", &URL_SAFE, padded.as_str()),
    ];

    for (variant, engine, input) in attempts {
        if let Ok(decoded) = engine.decode(input) {
            trace!(
                "Decoded {} Base64 chars as {} Base64",
                cleaned.len(),
                variant
            );
            return Ok(decoded);
        }
    }

    bail!("Failed to decode Base64 content")
}

/// Adds proper padding to Base64 string if missing
///
/// Base64 strings should have a length that is a multiple of 4.
/// This function adds '=' padding characters as needed.
pub fn add_base64_padding(s: &str) -> String {
    let mut result = s.to_string();
    while !result.len().is_multiple_of(4) {
        result.push('=');
    }
    result
}

/// Decodes Base64 content into text
///
/// Decoded bytes that are not UTF-8 go through the legacy code page fallback
/// of [`decode_bytes`].
pub fn decode_base64_text(content: &str) -> Result<String> {
    let decoded = decode_base64(content.trim()).context("Content is not valid Base64")?;
    Ok(decode_bytes(&decoded))
}
