//! Hysteria (v1) protocol parser
//!
//! Format: hysteria://host:port?auth=...&protocol=udp&upmbps=50&downmbps=100&peer=...#name

use anyhow::{Result, anyhow};
use tracing::trace;
use url::Url;

use crate::config::proxy::{DEFAULT_HYSTERIA_MBPS, HysteriaOptions, ProxyProtocol, ProxyRecord};
use crate::config::util::split_list;

use super::{
    ProtocolParser, fallback_name, first_param, flag_enabled, fragment_name, host_string,
    query_params, user_info,
};

const DEFAULT_PORT: u16 = 443;

// ============================================================================
// Hysteria Parser
// ============================================================================

/// Parser for Hysteria (hysteria://) URIs
pub struct HysteriaParser;

impl ProtocolParser for HysteriaParser {
    fn scheme(&self) -> &str {
        "hysteria"
    }

    fn parse(&self, uri: &str) -> Result<ProxyRecord> {
        trace!("Parsing Hysteria URI");
        let url =
            Url::parse(uri.trim()).map_err(|e| anyhow!("Failed to parse Hysteria URI: {}", e))?;

        let server = host_string(&url)?;
        let port = url.port().unwrap_or(DEFAULT_PORT);
        let params = query_params(&url);
        let name = fragment_name(&url).unwrap_or_else(|| fallback_name("hysteria", &server));

        let auth_str = Some(user_info(&url))
            .filter(|a| !a.is_empty())
            .or_else(|| first_param(&params, &["auth", "auth_str"]))
            .unwrap_or_default();

        Ok(ProxyRecord::new(
            name,
            server,
            port,
            ProxyProtocol::Hysteria(HysteriaOptions {
                auth_str,
                protocol: first_param(&params, &["protocol"]).unwrap_or_else(|| "udp".to_string()),
                up: bandwidth(first_param(&params, &["upmbps", "up"])),
                down: bandwidth(first_param(&params, &["downmbps", "down"])),
                sni: first_param(&params, &["peer", "sni"]),
                skip_cert_verify: flag_enabled(&params, &["insecure", "allowInsecure"]),
                alpn: first_param(&params, &["alpn"])
                    .map(|a| split_list(&a))
                    .unwrap_or_default(),
                obfs: first_param(&params, &["obfs"]),
            }),
        ))
    }
}

/// Leading digits of a bandwidth value (`"100"`, `"100 Mbps"`), default 50
fn bandwidth(value: Option<String>) -> u32 {
    value
        .and_then(|v| {
            let digits: String = v.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        })
        .unwrap_or(DEFAULT_HYSTERIA_MBPS)
}
