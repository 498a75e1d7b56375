//! VLESS protocol parser
//!
//! Format: vless://uuid@host:port?type=ws&security=reality&pbk=...#name

use anyhow::{Result, anyhow, bail};
use tracing::trace;
use url::Url;

use crate::config::proxy::{ProxyProtocol, ProxyRecord, RealityOptions, VlessOptions};

use super::{
    ProtocolParser, build_transport, fallback_name, first_param, flag_enabled, fragment_name,
    host_string, query_params, user_info,
};

const DEFAULT_FINGERPRINT: &str = "chrome";

// ============================================================================
// VLESS Parser
// ============================================================================

/// Parser for VLESS (vless://) URIs
pub struct VLessParser;

impl ProtocolParser for VLessParser {
    fn scheme(&self) -> &str {
        "vless"
    }

    fn parse(&self, uri: &str) -> Result<ProxyRecord> {
        trace!("Parsing VLESS URI");
        let url =
            Url::parse(uri.trim()).map_err(|e| anyhow!("Failed to parse VLESS URI: {}", e))?;

        let uuid = user_info(&url);
        if uuid.is_empty() {
            bail!("VLESS URI missing UUID");
        }
        let server = host_string(&url)?;
        let port = url
            .port()
            .ok_or_else(|| anyhow!("VLESS URI missing port"))?;

        let params = query_params(&url);
        let name = fragment_name(&url).unwrap_or_else(|| fallback_name("vless", &server));

        let security = params
            .get("security")
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        let tls = security == "tls" || security == "reality";

        let reality_opts = if security == "reality" {
            let public_key = first_param(&params, &["pbk"])
                .ok_or_else(|| anyhow!("VLESS REALITY link missing public key (pbk)"))?;
            Some(RealityOptions {
                public_key,
                short_id: first_param(&params, &["sid"]),
            })
        } else {
            None
        };

        let (servername, client_fingerprint, flow) = if tls {
            (
                Some(first_param(&params, &["sni"]).unwrap_or_else(|| server.clone())),
                Some(
                    first_param(&params, &["fp"])
                        .unwrap_or_else(|| DEFAULT_FINGERPRINT.to_string()),
                ),
                first_param(&params, &["flow"]),
            )
        } else {
            (None, None, None)
        };

        let host_header = first_param(&params, &["host"]).unwrap_or_else(|| server.clone());
        let transport = build_transport(
            params.get("type").map(String::as_str),
            params.get("path").map(String::as_str),
            Some(&host_header),
            params.get("serviceName").map(String::as_str),
        );

        Ok(ProxyRecord::new(
            name,
            server,
            port,
            ProxyProtocol::Vless(VlessOptions {
                uuid,
                network: transport.network,
                tls,
                servername,
                client_fingerprint,
                flow,
                skip_cert_verify: flag_enabled(&params, &["allowInsecure", "insecure"]),
                reality_opts,
                ws_opts: transport.ws_opts,
                grpc_opts: transport.grpc_opts,
            }),
        ))
    }
}
