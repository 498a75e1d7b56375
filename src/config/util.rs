//! Utility functions for serde serialization/deserialization.
//!
//! Subscription providers are loose about scalar types: ports arrive as
//! strings, booleans as `"true"`, single hosts where lists are expected.
//! The helpers here accept those shapes while the model keeps strict types.

use serde::{Deserialize, Deserializer};

// ============================================================================
// Boolean Helpers
// ============================================================================

/// Returns `true` if the boolean value is `false`.
///
/// Used with `#[serde(skip_serializing_if = "is_false")]` to omit false values.
#[inline]
pub fn is_false(b: &bool) -> bool {
    !*b
}

pub fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolLike {
    Bool(bool),
    Number(i64),
    String(String),
}

fn bool_from_like<E: serde::de::Error>(value: BoolLike) -> Result<bool, E> {
    match value {
        BoolLike::Bool(b) => Ok(b),
        BoolLike::Number(n) => Ok(n != 0),
        BoolLike::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(E::custom(format!("invalid boolean value: {}", other))),
        },
    }
}

/// Deserializes a boolean that may be written as `true`, `1` or `"true"`.
pub fn bool_like<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    bool_from_like(BoolLike::deserialize(deserializer)?)
}

// ============================================================================
// Port Deserializers
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u64),
    String(String),
}

/// Deserializes a port given either as a number or a numeric string.
///
/// Port 0 is rejected; the valid range is 1..=65535.
pub fn port_from_any<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match PortValue::deserialize(deserializer)? {
        PortValue::Number(n) => n,
        PortValue::String(s) => s.trim().parse().map_err(serde::de::Error::custom)?,
    };
    match u16::try_from(raw) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(serde::de::Error::custom(format!(
            "port out of range: {}",
            raw
        ))),
    }
}

/// Deserializes an unsigned integer given either as a number or a numeric string.
pub fn u32_from_any<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match PortValue::deserialize(deserializer)? {
        PortValue::Number(n) => u32::try_from(n).map_err(serde::de::Error::custom),
        PortValue::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Deserializes a bandwidth in Mbps given as `50`, `"50"` or `"50 Mbps"`.
pub fn mbps_from_any<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match PortValue::deserialize(deserializer)? {
        PortValue::Number(n) => u32::try_from(n).map_err(serde::de::Error::custom),
        PortValue::String(s) => {
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().map_err(|_| {
                serde::de::Error::custom(format!("invalid bandwidth value: {}", s))
            })
        }
    }
}

// ============================================================================
// String or Vec Deserializer
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrVec {
    Single(String),
    Multiple(Vec<String>),
}

/// Deserializes a field that can be either a single string or an array of strings.
///
/// Use with `#[serde(default, deserialize_with = "string_or_vec")]`
pub fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::Single(s) => Ok(vec![s]),
        StringOrVec::Multiple(v) => Ok(v),
    }
}

/// Splits a comma-separated list, dropping empty items.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
