//! Hysteria2 protocol parser
//!
//! This module provides parsing for Hysteria2 (hysteria2:// or hy2://) URIs.
//! Two shapes exist in the wild:
//! - bare `hysteria2://host:port`, where the whole content doubles as password
//! - URL form `hysteria2://password@host:port?sni=...&obfs=...#name`

use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::config::proxy::{Hysteria2Options, ProxyProtocol, ProxyRecord};

use super::{
    ProtocolParser, fallback_name, first_param, flag_enabled, fragment_name, host_string,
    parse_host_port, query_params, strip_scheme, user_info,
};

const DEFAULT_PORT: u16 = 443;
const DEFAULT_FINGERPRINT: &str = "chrome";

// ============================================================================
// SNI Rewrite
// ============================================================================

/// Replaces SNI values containing any of `patterns` with `fallback`.
///
/// Some providers publish placeholder SNI values that no server answers to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SniRewrite {
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    #[serde(default = "default_fallback")]
    pub fallback: String,
}

impl Default for SniRewrite {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            fallback: default_fallback(),
        }
    }
}

fn default_patterns() -> Vec<String> {
    vec!["5i996.top".to_string(), "ip地址".to_string()]
}

fn default_fallback() -> String {
    "bing.com".to_string()
}

impl SniRewrite {
    /// Returns the SNI to use for `sni`
    pub fn apply(&self, sni: String) -> String {
        if self
            .patterns
            .iter()
            .any(|p| !p.is_empty() && sni.contains(p.as_str()))
        {
            debug!("Rewriting SNI '{}' to '{}'", sni, self.fallback);
            return self.fallback.clone();
        }
        sni
    }
}

// ============================================================================
// Hysteria2 Parser
// ============================================================================

/// Parser for Hysteria2 (hysteria2:// or hy2://) URIs
pub struct Hysteria2Parser {
    scheme: &'static str,
    sni_rewrite: Arc<SniRewrite>,
}

impl Hysteria2Parser {
    pub fn new(scheme: &'static str, sni_rewrite: Arc<SniRewrite>) -> Self {
        Self {
            scheme,
            sni_rewrite,
        }
    }

    /// `host:port` without query, fragment or user-info
    fn parse_bare(&self, content: &str) -> Result<ProxyRecord> {
        trace!("Parsing bare Hysteria2 host:port form");
        let (server, port) = parse_host_port(content)?;
        let sni = self.sni_rewrite.apply(server.clone());

        Ok(ProxyRecord::new(
            fallback_name("hysteria2", &server),
            server,
            port,
            ProxyProtocol::Hysteria2(Hysteria2Options {
                password: content.to_string(),
                sni: Some(sni),
                skip_cert_verify: true,
                client_fingerprint: Some(DEFAULT_FINGERPRINT.to_string()),
                ..Default::default()
            }),
        ))
    }

    fn parse_url(&self, uri: &str) -> Result<ProxyRecord> {
        let url = Url::parse(uri).map_err(|e| anyhow!("Failed to parse Hysteria2 URI: {}", e))?;

        let server = host_string(&url)?;
        let port = url.port().unwrap_or(DEFAULT_PORT);
        let params = query_params(&url);
        let name = fragment_name(&url).unwrap_or_else(|| fallback_name("hysteria2", &server));

        let password = Some(user_info(&url))
            .filter(|p| !p.is_empty())
            .or_else(|| first_param(&params, &["password", "auth"]))
            .unwrap_or_default();

        let sni = first_param(&params, &["sni", "peer"]).unwrap_or_else(|| server.clone());
        let sni = self.sni_rewrite.apply(sni);

        // obfs is only meaningful with its password
        let (obfs, obfs_password) = match (
            first_param(&params, &["obfs"]),
            first_param(&params, &["obfs-password"]),
        ) {
            (Some(obfs), Some(password)) if obfs != "none" => (Some(obfs), Some(password)),
            _ => (None, None),
        };

        Ok(ProxyRecord::new(
            name,
            server,
            port,
            ProxyProtocol::Hysteria2(Hysteria2Options {
                password,
                sni: Some(sni),
                skip_cert_verify: flag_enabled(&params, &["insecure", "allowInsecure"]),
                client_fingerprint: Some(
                    first_param(&params, &["fingerprint", "fp"])
                        .unwrap_or_else(|| DEFAULT_FINGERPRINT.to_string()),
                ),
                ports: first_param(&params, &["mport"]).filter(|m| is_port_range(m)),
                obfs,
                obfs_password,
            }),
        ))
    }
}

impl ProtocolParser for Hysteria2Parser {
    fn scheme(&self) -> &str {
        self.scheme
    }

    fn parse(&self, uri: &str) -> Result<ProxyRecord> {
        trace!("Parsing Hysteria2 URI (scheme: {})", self.scheme);
        let uri = uri.trim();
        let content = strip_scheme(uri, self.scheme)
            .ok_or_else(|| anyhow!("Invalid Hysteria2 URI: missing {}:// prefix", self.scheme))?;

        if !content.contains(['?', '#', '@']) && content.contains(':') {
            return self.parse_bare(content.trim_end_matches('/'));
        }
        self.parse_url(uri)
    }
}

/// `20000-50000`, `443,8443` or a single port
fn is_port_range(value: &str) -> bool {
    value.split(',').all(|part| {
        let mut bounds = part.trim().splitn(2, '-');
        bounds.all(|p| p.trim().parse::<u16>().is_ok_and(|p| p != 0))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> Hysteria2Parser {
        Hysteria2Parser::new("hysteria2", Arc::new(SniRewrite::default()))
    }

    fn parse_hy2(uri: &str) -> (ProxyRecord, Hysteria2Options) {
        let record = parser().parse(uri).unwrap();
        let ProxyProtocol::Hysteria2(hy2) = record.protocol.clone() else {
            panic!("Expected Hysteria2 payload");
        };
        (record, hy2)
    }

    #[test]
    fn test_hysteria2_basic() {
        let (record, hy2) =
            parse_hy2("hysteria2://password@example.com:443?sni=sni.example.com#test-node");
        assert_eq!(record.name, "test-node");
        assert_eq!(record.server, "example.com");
        assert_eq!(record.port, 443);
        assert_eq!(hy2.password, "password");
        assert_eq!(hy2.sni.as_deref(), Some("sni.example.com"));
        assert_eq!(hy2.client_fingerprint.as_deref(), Some("chrome"));
        assert!(!hy2.skip_cert_verify);
    }

    #[test]
    fn test_hysteria2_bare_form() {
        let (record, hy2) = parse_hy2("hysteria2://hy.example.com:8443");
        assert_eq!(record.server, "hy.example.com");
        assert_eq!(record.port, 8443);
        assert_eq!(record.name, "hysteria2-hy.example.com");
        assert_eq!(hy2.password, "hy.example.com:8443");
        assert_eq!(hy2.sni.as_deref(), Some("hy.example.com"));
        assert!(hy2.skip_cert_verify);
    }

    #[test]
    fn test_hysteria2_password_from_query() {
        let (_, hy2) = parse_hy2("hysteria2://example.com:443?auth=qtoken");
        assert_eq!(hy2.password, "qtoken");
        let (_, hy2) = parse_hy2("hysteria2://example.com:443?password=ptoken&auth=qtoken");
        assert_eq!(hy2.password, "ptoken");
    }

    #[test]
    fn test_hysteria2_default_port_and_sni() {
        let (record, hy2) = parse_hy2("hysteria2://pw@example.com?insecure=1");
        assert_eq!(record.port, 443);
        assert_eq!(hy2.sni.as_deref(), Some("example.com"));
        assert!(hy2.skip_cert_verify);
    }

    #[test]
    fn test_hysteria2_peer_sni() {
        let (_, hy2) = parse_hy2("hysteria2://pw@example.com:443?peer=peer.example.com");
        assert_eq!(hy2.sni.as_deref(), Some("peer.example.com"));
    }

    #[test]
    fn test_hysteria2_insecure_zero_is_off() {
        let (_, hy2) = parse_hy2("hysteria2://pw@example.com:443?insecure=0");
        assert!(!hy2.skip_cert_verify);
        let (_, hy2) = parse_hy2("hysteria2://pw@example.com:443?allowInsecure=1");
        assert!(hy2.skip_cert_verify);
    }

    #[test]
    fn test_hysteria2_sni_rewrite() {
        let (_, hy2) = parse_hy2("hysteria2://pw@example.com:443?sni=node.5i996.top");
        assert_eq!(hy2.sni.as_deref(), Some("bing.com"));
        let (_, hy2) = parse_hy2("hysteria2://pw@example.com:443?sni=ip%E5%9C%B0%E5%9D%80");
        assert_eq!(hy2.sni.as_deref(), Some("bing.com"));
    }

    #[test]
    fn test_hysteria2_custom_sni_rewrite() {
        let rewrite = SniRewrite {
            patterns: vec!["placeholder".to_string()],
            fallback: "www.apple.com".to_string(),
        };
        let parser = Hysteria2Parser::new("hysteria2", Arc::new(rewrite));
        let record = parser
            .parse("hysteria2://pw@example.com:443?sni=placeholder.net")
            .unwrap();
        let ProxyProtocol::Hysteria2(hy2) = record.protocol else {
            panic!("Expected Hysteria2 payload");
        };
        assert_eq!(hy2.sni.as_deref(), Some("www.apple.com"));
    }

    #[test]
    fn test_hysteria2_obfs_requires_password() {
        let (_, hy2) =
            parse_hy2("hysteria2://pw@example.com:443?obfs=salamander&obfs-password=secret");
        assert_eq!(hy2.obfs.as_deref(), Some("salamander"));
        assert_eq!(hy2.obfs_password.as_deref(), Some("secret"));

        let (_, hy2) = parse_hy2("hysteria2://pw@example.com:443?obfs=salamander");
        assert!(hy2.obfs.is_none());
        assert!(hy2.obfs_password.is_none());
    }

    #[test]
    fn test_hysteria2_mport_and_fingerprint() {
        let (_, hy2) =
            parse_hy2("hysteria2://pw@example.com:443?mport=20000-50000&fingerprint=firefox");
        assert_eq!(hy2.ports.as_deref(), Some("20000-50000"));
        assert_eq!(hy2.client_fingerprint.as_deref(), Some("firefox"));

        let (_, hy2) = parse_hy2("hysteria2://pw@example.com:443?mport=abc");
        assert!(hy2.ports.is_none());
    }

    #[test]
    fn test_hy2_alias() {
        let parser = Hysteria2Parser::new("hy2", Arc::new(SniRewrite::default()));
        let record = parser.parse("hy2://pw@example.com:443#alias").unwrap();
        assert_eq!(record.name, "alias");
        assert_eq!(record.type_name(), "hysteria2");
        assert!(parser.parse("hysteria2://pw@example.com:443").is_err());
    }

    #[test]
    fn test_is_port_range() {
        assert!(is_port_range("443"));
        assert!(is_port_range("20000-50000"));
        assert!(is_port_range("443,8443-8450"));
        assert!(!is_port_range("abc"));
        assert!(!is_port_range("0-10"));
    }
}
