//! Proxy name normalisation
//!
//! Every proxy name in a generated document must be unique, since groups and
//! rules refer to proxies by name. Names also arrive percent-encoded or
//! mangled by a wrong code page, so they are cleaned up before the collision
//! pass.

use std::collections::HashSet;
use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use tracing::{debug, info};

use crate::config::proxy::ProxyRecord;
use crate::parser::text::percent_decode;

static PERCENT_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%[0-9A-Fa-f]{2}").unwrap_or_else(|e| panic!("invalid regex: {}", e))
});

/// Nested encoding layers decoded before a name is left as it is
const MAX_DECODE_ROUNDS: usize = 4;

// ============================================================================
// Name Uniquification
// ============================================================================

/// Make every record name non-empty, readable and unique, in place.
///
/// Records keep their order. The first occurrence of a name keeps it; later
/// ones get `_1`, `_2`, ... Running this on its own output changes nothing.
pub fn uniquify_names(records: &mut [ProxyRecord]) {
    uniquify_names_with_rng(records, &mut rand::thread_rng());
}

/// [`uniquify_names`] with an explicit source for placeholder numbers
pub fn uniquify_names_with_rng<R: Rng + ?Sized>(records: &mut [ProxyRecord], rng: &mut R) {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let mut renamed = 0usize;

    for record in records.iter_mut() {
        let cleaned = clean_name(record, rng);
        let unique = next_free_name(&cleaned, &seen);
        if unique != record.name {
            debug!("Renamed proxy {:?} -> {:?}", record.name, unique);
            renamed += 1;
        }
        seen.insert(unique.clone());
        record.name = unique;
    }

    if renamed > 0 {
        info!("Normalised {} of {} proxy names", renamed, records.len());
    }
}

/// Placeholder, percent-decoding and garbage replacement for one name
fn clean_name<R: Rng + ?Sized>(record: &ProxyRecord, rng: &mut R) -> String {
    let name = record.name.trim();
    if name.is_empty() {
        return format!("unnamed_{}", placeholder_number(rng));
    }

    let name = decode_name(name);

    if is_garbled(&name) {
        return format!(
            "{}-{}-{}",
            record.type_name(),
            record.server,
            placeholder_number(rng)
        );
    }
    name
}

/// Percent-decode until no escape is left.
///
/// A name still holding escapes after [`MAX_DECODE_ROUNDS`] is returned
/// unchanged, so the result never decodes any further on a later pass.
fn decode_name(name: &str) -> String {
    let mut current = name.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        if !PERCENT_ESCAPE.is_match(&current) {
            return current;
        }
        let decoded = percent_decode(&current).trim().to_string();
        if decoded == current {
            break;
        }
        current = decoded;
    }
    if PERCENT_ESCAPE.is_match(&current) {
        name.to_string()
    } else {
        current
    }
}

/// Replacement or control characters left over from a bad decode
pub fn is_garbled(name: &str) -> bool {
    name.is_empty() || name.chars().any(|c| c == '\u{FFFD}' || c.is_control())
}

fn placeholder_number<R: Rng + ?Sized>(rng: &mut R) -> u16 {
    rng.gen_range(1000..=9999)
}

/// `base`, or the first of `base_1`, `base_2`, ... not yet taken
fn next_free_name(base: &str, seen: &HashSet<String>) -> String {
    if !seen.contains(base) {
        return base.to_string();
    }
    (1usize..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !seen.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}
