//! Shadowsocks protocol parser
//!
//! This module provides parsing for Shadowsocks (ss://) URIs.
//! Supports SIP002 (plain or Base64 user-info), the legacy whole-authority
//! Base64 form, SIP003 plugins and the older `obfs` query keys.

use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::{trace, warn};
use url::form_urlencoded;

use crate::config::proxy::{PluginOptions, ProxyProtocol, ProxyRecord, ShadowsocksOptions};
use crate::parser::base64::decode_base64_text;
use crate::parser::text::{percent_decode, split_fragment};

use super::{ProtocolParser, fallback_name, parse_host_port, strip_scheme};

// ============================================================================
// Shadowsocks Parser
// ============================================================================

/// Parser for Shadowsocks (ss://) URIs
///
/// - SIP002: ss://BASE64(method:password)@host:port#name
/// - SIP002 with plain user-info: ss://method:password@host:port#name
/// - SIP003 plugin: ss://userinfo@host:port/?plugin=name;opts#name
/// - Legacy: ss://BASE64(method:password@host:port)#name
pub struct ShadowsocksParser;

/// Credentials and endpoint recovered by one extraction strategy
#[derive(Debug, PartialEq)]
struct Credentials {
    method: String,
    password: String,
    server: String,
    port: u16,
}

type Strategy = fn(&str) -> Option<Credentials>;

/// Tried in order; the first strategy yielding a complete pair wins
const STRATEGIES: &[(&str, Strategy)] = &[
    ("plain user-info", plain_user_info),
    ("base64 user-info", base64_user_info),
    ("base64 authority", base64_authority),
];

impl ProtocolParser for ShadowsocksParser {
    fn scheme(&self) -> &str {
        "ss"
    }

    fn parse(&self, uri: &str) -> Result<ProxyRecord> {
        trace!("Parsing Shadowsocks URI");
        let without_scheme = strip_scheme(uri.trim(), "ss")
            .ok_or_else(|| anyhow!("Invalid Shadowsocks URI: missing ss:// prefix"))?;

        let (main_part, name) = split_fragment(without_scheme);
        let (authority, query) = match main_part.split_once('?') {
            Some((authority, query)) => (authority, Some(query)),
            None => (main_part, None),
        };
        let authority = authority.trim_end_matches('/');
        if authority.is_empty() {
            bail!("Invalid Shadowsocks URI: empty authority");
        }

        let credentials = STRATEGIES
            .iter()
            .find_map(|(label, strategy)| {
                let found = strategy(authority);
                if found.is_some() {
                    trace!("Shadowsocks credentials extracted from {}", label);
                }
                found
            })
            .ok_or_else(|| anyhow!("Unable to extract Shadowsocks credentials"))?;

        let params = query.map(query_map).unwrap_or_default();
        let (plugin, plugin_opts) = plugin_from_query(&params);

        let name = name.unwrap_or_else(|| fallback_name("ss", &credentials.server));

        Ok(ProxyRecord::new(
            name,
            credentials.server,
            credentials.port,
            ProxyProtocol::Shadowsocks(ShadowsocksOptions {
                cipher: credentials.method,
                password: credentials.password,
                plugin,
                plugin_opts,
            }),
        ))
    }
}

// ============================================================================
// Credential Strategies
// ============================================================================

fn split_pair(pair: &str) -> Option<(String, String)> {
    let (method, password) = pair.split_once(':')?;
    if method.is_empty() {
        return None;
    }
    Some((method.to_string(), password.to_string()))
}

fn with_endpoint(pair: &str, hostport: &str) -> Option<Credentials> {
    let (method, password) = split_pair(pair)?;
    let (server, port) = parse_host_port(hostport).ok()?;
    Some(Credentials {
        method,
        password,
        server,
        port,
    })
}

/// `method:password@host:port`
fn plain_user_info(authority: &str) -> Option<Credentials> {
    let (user_info, hostport) = authority.rsplit_once('@')?;
    let decoded = percent_decode(user_info);
    with_endpoint(&decoded, hostport)
}

/// `BASE64(method:password)@host:port`, accepted only when the decoded text has a `:`
fn base64_user_info(authority: &str) -> Option<Credentials> {
    let (user_info, hostport) = authority.rsplit_once('@')?;
    let decoded = decode_base64_text(&percent_decode(user_info)).ok()?;
    if !decoded.contains(':') {
        return None;
    }
    with_endpoint(&decoded, hostport)
}

/// `BASE64(method:password@host:port)`
fn base64_authority(authority: &str) -> Option<Credentials> {
    let decoded = decode_base64_text(&percent_decode(authority)).ok()?;
    let (pair, hostport) = decoded.trim().rsplit_once('@')?;
    with_endpoint(pair, hostport)
}

// ============================================================================
// Plugins
// ============================================================================

fn query_map(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

/// Maps the SIP003 `plugin` parameter, or the legacy `obfs` keys, to Clash
/// `plugin` + `plugin-opts`.
fn plugin_from_query(params: &HashMap<String, String>) -> (Option<String>, Option<PluginOptions>) {
    if let Some(raw) = params.get("plugin").filter(|p| !p.is_empty()) {
        let (name, opts) = raw.split_once(';').unwrap_or((raw.as_str(), ""));
        let opts: HashMap<&str, &str> = opts
            .split(';')
            .filter(|o| !o.is_empty())
            .map(|o| o.split_once('=').unwrap_or((o, "")))
            .collect();
        return map_plugin(name, &opts);
    }

    if let Some(mode) = params.get("obfs").filter(|m| !m.is_empty()) {
        let opts = PluginOptions {
            mode: Some(mode.clone()),
            host: params.get("obfs-host").cloned(),
            path: params.get("obfs-uri").cloned(),
            tls: false,
        };
        return (Some("obfs".to_string()), Some(opts));
    }

    (None, None)
}

fn map_plugin(name: &str, opts: &HashMap<&str, &str>) -> (Option<String>, Option<PluginOptions>) {
    let get = |key: &str| opts.get(key).filter(|v| !v.is_empty()).map(|v| v.to_string());

    let (plugin, options) = match name {
        "obfs-local" | "simple-obfs" => (
            "obfs",
            PluginOptions {
                mode: get("obfs"),
                host: get("obfs-host"),
                path: get("obfs-uri"),
                tls: false,
            },
        ),
        "v2ray-plugin" => (
            "v2ray-plugin",
            PluginOptions {
                mode: get("mode").or_else(|| Some("websocket".to_string())),
                host: get("host"),
                path: get("path"),
                tls: opts.contains_key("tls"),
            },
        ),
        other => {
            warn!(plugin = other, "Unknown SIP003 plugin, options kept as-is");
            (
                other,
                PluginOptions {
                    mode: get("mode"),
                    host: get("host"),
                    path: get("path"),
                    tls: opts.contains_key("tls"),
                },
            )
        }
    };

    let options = (!options.is_empty()).then_some(options);
    (Some(plugin.to_string()), options)
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a Shadowsocks record as a SIP002 URI.
///
/// Returns `None` for records of other protocols.
pub fn encode_shadowsocks_uri(record: &ProxyRecord) -> Option<String> {
    let ProxyProtocol::Shadowsocks(ss) = &record.protocol else {
        return None;
    };

    let user_info = URL_SAFE_NO_PAD.encode(format!("{}:{}", ss.cipher, ss.password));
    let host = if record.server.contains(':') {
        format!("[{}]", record.server)
    } else {
        record.server.clone()
    };

    let mut uri = format!("ss://{}@{}:{}", user_info, host, record.port);
    if let Some(plugin) = &ss.plugin {
        let sip003 = plugin_string(plugin, ss.plugin_opts.as_ref());
        uri.push_str("/?plugin=");
        uri.push_str(&urlencoding::encode(&sip003));
    }
    if !record.name.is_empty() {
        uri.push('#');
        uri.push_str(&urlencoding::encode(&record.name));
    }
    Some(uri)
}

fn plugin_string(plugin: &str, opts: Option<&PluginOptions>) -> String {
    let (name, mode_key, host_key, path_key) = match plugin {
        "obfs" => ("obfs-local", "obfs", "obfs-host", "obfs-uri"),
        other => (other, "mode", "host", "path"),
    };

    let mut parts = vec![name.to_string()];
    if let Some(opts) = opts {
        if let Some(mode) = &opts.mode {
            parts.push(format!("{}={}", mode_key, mode));
        }
        if opts.tls {
            parts.push("tls".to_string());
        }
        if let Some(host) = &opts.host {
            parts.push(format!("{}={}", host_key, host));
        }
        if let Some(path) = &opts.path {
            parts.push(format!("{}={}", path_key, path));
        }
    }
    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn parse_ss(uri: &str) -> (ProxyRecord, ShadowsocksOptions) {
        let record = ShadowsocksParser.parse(uri).unwrap();
        let ProxyProtocol::Shadowsocks(ss) = record.protocol.clone() else {
            panic!("Expected Shadowsocks payload");
        };
        (record, ss)
    }

    #[test]
    fn test_shadowsocks_base64_user_info() {
        let (record, ss) = parse_ss("ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@1.2.3.4:8388#MyNode");
        assert_eq!(record.name, "MyNode");
        assert_eq!(record.server, "1.2.3.4");
        assert_eq!(record.port, 8388);
        assert!(record.udp);
        assert_eq!(ss.cipher, "aes-256-gcm");
        assert_eq!(ss.password, "password");
        assert!(ss.plugin.is_none());
    }

    #[test]
    fn test_shadowsocks_plain_user_info() {
        let (_, ss) = parse_ss("ss://chacha20-ietf-poly1305:p%40ss@example.com:443#plain");
        assert_eq!(ss.cipher, "chacha20-ietf-poly1305");
        assert_eq!(ss.password, "p@ss");
    }

    #[test]
    fn test_shadowsocks_legacy_format() {
        let encoded = STANDARD.encode("aes-256-gcm:password@example.com:8388");
        let (record, ss) = parse_ss(&format!("ss://{}#legacy-test", encoded));
        assert_eq!(record.name, "legacy-test");
        assert_eq!(record.server, "example.com");
        assert_eq!(record.port, 8388);
        assert_eq!(ss.cipher, "aes-256-gcm");
        assert_eq!(ss.password, "password");
    }

    #[test]
    fn test_shadowsocks_base64_user_info_without_colon_is_rejected() {
        // "justpassword" has no method separator
        let encoded = STANDARD.encode("justpassword");
        assert!(
            ShadowsocksParser
                .parse(&format!("ss://{}@example.com:8388", encoded))
                .is_err()
        );
    }

    #[test]
    fn test_shadowsocks_without_name() {
        let (record, _) = parse_ss("ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388");
        assert_eq!(record.name, "ss-example.com");
    }

    #[test]
    fn test_shadowsocks_url_encoded_name() {
        let (record, _) = parse_ss(
            "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388#%F0%9F%87%BA%F0%9F%87%B8%20US%20Server",
        );
        assert_eq!(record.name, "🇺🇸 US Server");
    }

    #[test]
    fn test_shadowsocks_gbk_name() {
        let (record, _) =
            parse_ss("ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388#%CF%E3%B8%DB");
        assert_eq!(record.name, "香港");
    }

    #[test]
    fn test_shadowsocks_ipv6_host() {
        let encoded = STANDARD.encode("aes-256-gcm:password");
        let (record, _) = parse_ss(&format!("ss://{}@[::1]:8388#ipv6-test", encoded));
        assert_eq!(record.server, "::1");
        assert_eq!(record.port, 8388);
    }

    #[test]
    fn test_shadowsocks_sip003_obfs_local() {
        let (_, ss) = parse_ss(
            "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388/?plugin=obfs-local%3Bobfs%3Dhttp%3Bobfs-host%3Dcdn.example.com#sip003",
        );
        assert_eq!(ss.plugin.as_deref(), Some("obfs"));
        let opts = ss.plugin_opts.unwrap();
        assert_eq!(opts.mode.as_deref(), Some("http"));
        assert_eq!(opts.host.as_deref(), Some("cdn.example.com"));
    }

    #[test]
    fn test_shadowsocks_sip003_simple_obfs_no_slash() {
        let (_, ss) = parse_ss(
            "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388?plugin=simple-obfs%3Bobfs%3Dtls#noslash",
        );
        assert_eq!(ss.plugin.as_deref(), Some("obfs"));
        assert_eq!(ss.plugin_opts.unwrap().mode.as_deref(), Some("tls"));
    }

    #[test]
    fn test_shadowsocks_sip003_plugin_name_only() {
        let (_, ss) =
            parse_ss("ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388/?plugin=obfs-local#only");
        assert_eq!(ss.plugin.as_deref(), Some("obfs"));
        assert!(ss.plugin_opts.is_none());
    }

    #[test]
    fn test_shadowsocks_sip003_v2ray_plugin() {
        let (_, ss) = parse_ss(
            "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388/?plugin=v2ray-plugin%3Bserver%3Btls%3Bhost%3Dexample.com#v2ray",
        );
        assert_eq!(ss.plugin.as_deref(), Some("v2ray-plugin"));
        let opts = ss.plugin_opts.unwrap();
        assert!(opts.tls);
        assert_eq!(opts.mode.as_deref(), Some("websocket"));
        assert_eq!(opts.host.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_shadowsocks_legacy_obfs_query() {
        let (_, ss) = parse_ss(
            "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388?obfs=http&obfs-host=a.com&obfs-uri=/x#legacy-obfs",
        );
        assert_eq!(ss.plugin.as_deref(), Some("obfs"));
        let opts = ss.plugin_opts.unwrap();
        assert_eq!(opts.mode.as_deref(), Some("http"));
        assert_eq!(opts.host.as_deref(), Some("a.com"));
        assert_eq!(opts.path.as_deref(), Some("/x"));
    }

    #[test]
    fn test_shadowsocks_invalid_uri() {
        let parser = ShadowsocksParser;
        assert!(parser.parse("ss://").is_err());
        assert!(parser.parse("ss://invalid").is_err());
        assert!(parser.parse("ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com").is_err());
        assert!(parser.parse("vmess://wrong-scheme").is_err());
    }

    #[test]
    fn test_encode_roundtrip() {
        let uris = [
            "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@1.2.3.4:8388#MyNode",
            "ss://chacha20-ietf-poly1305:secret@[2001:db8::1]:443#%E9%A6%99%E6%B8%AF%2001",
            "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388/?plugin=obfs-local%3Bobfs%3Dhttp%3Bobfs-host%3Da.com#obfs",
            "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388/?plugin=v2ray-plugin%3Btls%3Bhost%3Db.com%3Bpath%3D%2Fws#v2",
        ];
        for uri in uris {
            let record = ShadowsocksParser.parse(uri).unwrap();
            let encoded = encode_shadowsocks_uri(&record).unwrap();
            let reparsed = ShadowsocksParser.parse(&encoded).unwrap();
            assert_eq!(reparsed, record, "roundtrip failed for {}", uri);
        }
    }

    #[test]
    fn test_encode_other_protocol_is_none() {
        let record = ProxyRecord::new(
            "t",
            "h",
            1,
            ProxyProtocol::Trojan(crate::config::proxy::TrojanOptions::default()),
        );
        assert!(encode_shadowsocks_uri(&record).is_none());
    }

    #[test]
    fn test_scheme_and_can_parse() {
        let parser = ShadowsocksParser;
        assert_eq!(parser.scheme(), "ss");
        assert!(parser.can_parse("ss://abc"));
        assert!(parser.can_parse("SS://abc"));
        assert!(!parser.can_parse("vmess://abc"));
        assert!(!parser.can_parse("not-a-uri"));
    }
}
