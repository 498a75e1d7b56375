//! Pre-structured subscription entries
//!
//! Clash YAML and JSON subscriptions already carry proxies as maps using the
//! same field names as [`ProxyRecord`]. Entries are converted one at a time
//! so a single malformed proxy does not discard the rest of the list.

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::proxy::ProxyRecord;

use super::ParseReport;
use super::protocols::fallback_name;
use super::text::preview;

/// Extract the `proxies` list of a Clash YAML document.
///
/// Returns `None` when the document has no `proxies` key.
pub fn extract_yaml(content: &str) -> Result<Option<ParseReport>> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(content).context("Failed to parse Clash YAML subscription")?;

    let Some(proxies) = document.get("proxies") else {
        return Ok(None);
    };
    let entries = match proxies {
        serde_yaml::Value::Sequence(entries) => entries.clone(),
        serde_yaml::Value::Null => Vec::new(),
        _ => return Err(anyhow!("'proxies' is not a list")),
    };

    debug!("Clash YAML subscription lists {} proxies", entries.len());
    let mut report = ParseReport::default();
    for entry in entries {
        match serde_json::to_value(&entry) {
            Ok(value) => collect_entry(&mut report, value),
            Err(e) => report.push_failure(
                &format!("{:?}", entry),
                format!("Unsupported YAML entry: {}", e),
            ),
        }
    }
    Ok(Some(report))
}

/// Extract proxies from a JSON object with `proxies`, or a top-level array.
///
/// Returns `None` when an object has no `proxies` key.
pub fn extract_json(content: &str) -> Result<Option<ParseReport>> {
    let document: Value =
        serde_json::from_str(content.trim()).context("Failed to parse JSON subscription")?;

    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("proxies") {
            Some(Value::Array(entries)) => entries,
            Some(Value::Null) => Vec::new(),
            Some(_) => return Err(anyhow!("'proxies' is not a list")),
            None => return Ok(None),
        },
        _ => return Err(anyhow!("JSON subscription is neither an object nor an array")),
    };

    debug!("JSON subscription lists {} proxies", entries.len());
    let mut report = ParseReport::default();
    for entry in entries {
        collect_entry(&mut report, entry);
    }
    Ok(Some(report))
}

/// Convert one JSON object line of a line list
pub fn record_from_json_line(line: &str) -> Result<ProxyRecord> {
    let value: Value = serde_json::from_str(line).context("Invalid JSON proxy line")?;
    record_from_value(value)
}

/// Convert one structured entry into a validated record.
///
/// Entries without a name are named `<type>-<server>`.
pub fn record_from_value(value: Value) -> Result<ProxyRecord> {
    if !value.is_object() {
        return Err(anyhow!("Proxy entry is not a map"));
    }

    let mut record: ProxyRecord =
        serde_json::from_value(value).map_err(|e| anyhow!("Invalid proxy entry: {}", e))?;

    record.name = record.name.trim().to_string();
    if record.name.is_empty() {
        record.name = fallback_name(record.type_name(), &record.server);
    }

    record.validate()?;
    trace!("Structured entry -> {}", record);
    Ok(record)
}

fn collect_entry(report: &mut ParseReport, entry: Value) {
    let label = describe_entry(&entry);
    match record_from_value(entry) {
        Ok(record) => report.push_record(record),
        Err(e) => report.push_failure(&label, format!("{:#}", e)),
    }
}

/// Name of an entry when it has one, otherwise a preview of the entry
fn describe_entry(entry: &Value) -> String {
    match entry.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => preview(&entry.to_string(), 30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::proxy::ProxyProtocol;

    const CLASH_YAML: &str = r#"
port: 7890
proxies:
  - name: "HK 01"
    type: ss
    server: hk.example.com
    port: 8388
    cipher: aes-256-gcm
    password: secret
  - name: "JP vmess"
    type: vmess
    server: jp.example.com
    port: "443"
    uuid: 11111111-2222-3333-4444-555555555555
    alterId: 0
    cipher: auto
    tls: true
    network: ws
    ws-opts:
      path: /ws
      headers:
        Host: cdn.example.com
  - name: broken
    type: trojan
    server: t.example.com
    port: 443
  - type: hysteria2
    server: hy.example.com
    port: 443
    password: pw
"#;

    #[test]
    fn test_extract_yaml_proxies() {
        let report = extract_yaml(CLASH_YAML).unwrap().unwrap();
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].input, "broken");

        let hk = &report.records[0];
        assert_eq!(hk.name, "HK 01");
        let ProxyProtocol::Shadowsocks(ss) = &hk.protocol else {
            panic!("Expected Shadowsocks payload");
        };
        assert_eq!(ss.cipher, "aes-256-gcm");

        let jp = &report.records[1];
        assert_eq!(jp.port, 443);
        let ProxyProtocol::Vmess(vmess) = &jp.protocol else {
            panic!("Expected VMess payload");
        };
        assert!(vmess.tls);
        let ws = vmess.ws_opts.as_ref().unwrap();
        assert_eq!(ws.path, "/ws");
        assert_eq!(ws.headers.get("Host").unwrap(), "cdn.example.com");

        assert_eq!(report.records[2].name, "hysteria2-hy.example.com");
    }

    #[test]
    fn test_extract_yaml_without_proxies() {
        assert!(extract_yaml("port: 7890\nrules: []\n").unwrap().is_none());
    }

    #[test]
    fn test_extract_yaml_invalid() {
        assert!(extract_yaml("proxies: [").is_err());
    }

    #[test]
    fn test_extract_json_object() {
        let content = r#"{"proxies": [
            {"name": "T", "type": "trojan", "server": "t.example.com", "port": 443, "password": "pw"},
            {"name": "X", "type": "wireguard", "server": "w.example.com", "port": 51820}
        ]}"#;
        let report = extract_json(content).unwrap().unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].name, "T");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].input, "X");
    }

    #[test]
    fn test_extract_json_array() {
        let content = r#"[{"type": "ss", "server": "s.example.com", "port": 8388, "cipher": "chacha20-ietf-poly1305", "password": "p"}]"#;
        let report = extract_json(content).unwrap().unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].name, "ss-s.example.com");
    }

    #[test]
    fn test_extract_json_without_proxies() {
        assert!(extract_json(r#"{"outbounds": []}"#).unwrap().is_none());
    }

    #[test]
    fn test_record_from_non_object() {
        assert!(record_from_value(Value::String("ss://x".to_string())).is_err());
    }

    #[test]
    fn test_record_from_json_line() {
        let record = record_from_json_line(
            r#"{"name":"L","type":"hysteria","server":"h.example.com","port":443,"auth_str":"t"}"#,
        )
        .unwrap();
        assert_eq!(record.name, "L");
        let ProxyProtocol::Hysteria(hy) = &record.protocol else {
            panic!("Expected Hysteria payload");
        };
        assert_eq!(hy.auth_str, "t");
        assert_eq!(hy.up, 50);
    }
}
