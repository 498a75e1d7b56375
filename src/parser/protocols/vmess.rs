//! VMess protocol parser
//!
//! VMess links are Base64-encoded JSON (the "v2rayN" format):
//! vmess://BASE64({ "v": "2", "ps": "name", "add": "host", "port": 443, ... })

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::trace;

use crate::config::proxy::{ProxyProtocol, ProxyRecord, VmessOptions};
use crate::config::util::{port_from_any, u32_from_any};
use crate::parser::base64::decode_base64_text;
use crate::parser::text::percent_decode;

use super::{ProtocolParser, build_transport, fallback_name, strip_scheme};

// ============================================================================
// VMess Parser
// ============================================================================

/// Parser for VMess (vmess://) URIs
pub struct VMessParser;

/// VMess link JSON. `add`, `port`, `id`, `aid` and `net` are mandatory.
#[derive(Deserialize, Debug)]
struct VMessJson {
    /// Remark/name
    #[serde(default)]
    ps: String,
    /// Server address
    add: String,
    /// Server port (string or number)
    #[serde(deserialize_with = "port_from_any")]
    port: u16,
    /// UUID
    id: String,
    /// Alter ID (string or number)
    #[serde(deserialize_with = "u32_from_any")]
    aid: u32,
    /// Network type (tcp, ws, h2, grpc)
    net: String,
    /// Cipher
    #[serde(default)]
    scy: Option<String>,
    /// `tls` to enable TLS
    #[serde(default)]
    tls: Option<String>,
    #[serde(default)]
    sni: Option<String>,
    /// ws Host header / h2 host
    #[serde(default)]
    host: Option<String>,
    /// ws/h2 path, gRPC service name
    #[serde(default)]
    path: Option<String>,
}

impl ProtocolParser for VMessParser {
    fn scheme(&self) -> &str {
        "vmess"
    }

    fn parse(&self, uri: &str) -> Result<ProxyRecord> {
        trace!("Parsing VMess URI");
        let encoded = strip_scheme(uri.trim(), "vmess")
            .ok_or_else(|| anyhow!("Invalid VMess URI: missing vmess:// prefix"))?;

        let decoded = decode_base64_text(encoded).context("Failed to decode VMess URI")?;
        let json: VMessJson =
            serde_json::from_str(&decoded).context("Failed to parse VMess JSON")?;

        trace!(
            "VMess config: server={}:{}, net={}, tls={:?}",
            json.add, json.port, json.net, json.tls
        );

        let name = if json.ps.trim().is_empty() {
            fallback_name("vmess", &json.add)
        } else {
            percent_decode(json.ps.trim())
        };

        let tls = json.tls.as_deref() == Some("tls");
        let servername = if tls {
            json.sni.filter(|s| !s.is_empty())
        } else {
            None
        };

        // gRPC carries its service name in `path`
        let transport = build_transport(
            Some(&json.net),
            json.path.as_deref(),
            json.host.as_deref(),
            json.path.as_deref(),
        );

        let cipher = json
            .scy
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "auto".to_string());

        Ok(ProxyRecord::new(
            name,
            json.add,
            json.port,
            ProxyProtocol::Vmess(VmessOptions {
                uuid: json.id,
                alter_id: json.aid,
                cipher,
                network: transport.network,
                tls,
                servername,
                skip_cert_verify: false,
                ws_opts: transport.ws_opts,
                h2_opts: transport.h2_opts,
                grpc_opts: transport.grpc_opts,
            }),
        ))
    }
}
