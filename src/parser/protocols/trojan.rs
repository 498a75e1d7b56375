//! Trojan protocol parser
//!
//! Format: trojan://password@host:port?sni=...&allowInsecure=1&type=ws#name

use anyhow::{Result, anyhow, bail};
use tracing::trace;
use url::Url;

use crate::config::proxy::{ProxyProtocol, ProxyRecord, TrojanOptions};

use super::{
    ProtocolParser, build_transport, fallback_name, first_param, flag_enabled, fragment_name,
    host_string, query_params, user_info,
};

// ============================================================================
// Trojan Parser
// ============================================================================

/// Parser for Trojan (trojan://) URIs
pub struct TrojanParser;

impl ProtocolParser for TrojanParser {
    fn scheme(&self) -> &str {
        "trojan"
    }

    fn parse(&self, uri: &str) -> Result<ProxyRecord> {
        trace!("Parsing Trojan URI");
        let url =
            Url::parse(uri.trim()).map_err(|e| anyhow!("Failed to parse Trojan URI: {}", e))?;

        let password = user_info(&url);
        if password.is_empty() {
            bail!("Trojan URI missing password");
        }
        let server = host_string(&url)?;
        let port = url
            .port()
            .ok_or_else(|| anyhow!("Trojan URI missing port"))?;

        let params = query_params(&url);
        let name = fragment_name(&url).unwrap_or_else(|| fallback_name("trojan", &server));

        let transport = build_transport(
            params.get("type").map(String::as_str),
            params.get("path").map(String::as_str),
            params.get("host").map(String::as_str),
            params.get("serviceName").map(String::as_str),
        );

        Ok(ProxyRecord::new(
            name,
            server,
            port,
            ProxyProtocol::Trojan(TrojanOptions {
                password,
                sni: first_param(&params, &["sni", "peer"]),
                skip_cert_verify: flag_enabled(&params, &["allowInsecure", "insecure"]),
                network: transport.network,
                ws_opts: transport.ws_opts,
                grpc_opts: transport.grpc_opts,
            }),
        ))
    }
}
