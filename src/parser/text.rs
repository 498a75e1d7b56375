//! Text decoding helpers
//!
//! Share links are written by many clients with many opinions about
//! encodings. Names in particular arrive percent-encoded, sometimes over GBK
//! bytes rather than UTF-8. Decoding here never fails: it falls back through
//! the legacy code pages and finally decodes lossily.

use std::borrow::Cow;

use encoding_rs::{GBK, WINDOWS_1252};
use tracing::trace;

/// Decode bytes as UTF-8, then GBK, then Windows-1252, then lossily
pub fn decode_bytes(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    if let Some(text) = GBK.decode_without_bom_handling_and_without_replacement(bytes) {
        trace!("Decoded {} bytes as GBK", bytes.len());
        return text.into_owned();
    }

    if let Some(text) = WINDOWS_1252.decode_without_bom_handling_and_without_replacement(bytes) {
        trace!("Decoded {} bytes as Windows-1252", bytes.len());
        return text.into_owned();
    }

    String::from_utf8_lossy(bytes).into_owned()
}

/// Percent-decode to bytes, then decode the bytes as text
pub fn percent_decode(input: &str) -> String {
    if !input.contains('%') {
        return input.to_string();
    }
    let bytes: Cow<[u8]> = urlencoding::decode_binary(input.as_bytes());
    decode_bytes(&bytes)
}

/// Split `main#fragment`, decoding a non-empty fragment as a display name
pub fn split_fragment(input: &str) -> (&str, Option<String>) {
    match input.split_once('#') {
        Some((main, fragment)) => {
            let name = percent_decode(fragment).trim().to_string();
            (main, (!name.is_empty()).then_some(name))
        }
        None => (input, None),
    }
}

/// First `len` characters of `input`, for log lines and failure reports
pub fn preview(input: &str, len: usize) -> String {
    let mut out: String = input.chars().take(len).collect();
    if input.chars().count() > len {
        out.push_str("...");
    }
    out
}
