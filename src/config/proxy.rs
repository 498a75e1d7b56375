//! Canonical proxy record
//!
//! Every decoder, whatever the share-link dialect, produces a [`ProxyRecord`].
//! The protocol-specific payload is a closed enum so each variant carries only
//! the fields its protocol understands. Field names follow the Clash/mihomo
//! proxy schema so records serialize straight into the `proxies` list and
//! pre-structured subscription entries deserialize straight back.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::config::util::{
    bool_like, default_true, is_false, mbps_from_any, port_from_any, string_or_vec, u32_from_any,
};

// ============================================================================
// Proxy Record
// ============================================================================

/// A decoded proxy node
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProxyRecord {
    /// Display name, unique within a generated document after uniquification
    #[serde(default)]
    pub name: String,

    /// Server host name or IP address
    pub server: String,

    /// Server port (1-65535)
    #[serde(deserialize_with = "port_from_any")]
    pub port: u16,

    /// Whether UDP relay is enabled
    #[serde(default = "default_true", deserialize_with = "bool_like")]
    pub udp: bool,

    /// Protocol and its payload, serialized as `type` plus the payload fields
    #[serde(flatten)]
    pub protocol: ProxyProtocol,
}

impl ProxyRecord {
    /// Create a record with UDP enabled
    pub fn new(
        name: impl Into<String>,
        server: impl Into<String>,
        port: u16,
        protocol: ProxyProtocol,
    ) -> Self {
        Self {
            name: name.into(),
            server: server.into(),
            port,
            udp: true,
            protocol,
        }
    }

    /// Clash type tag of this record (`ss`, `vmess`, ...)
    pub fn type_name(&self) -> &'static str {
        self.protocol.type_name()
    }

    /// Checks the fields every consumer relies on.
    ///
    /// A record that fails here must not reach the assembler.
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            bail!("{} proxy '{}' has no server", self.type_name(), self.name);
        }
        if self.port == 0 {
            bail!("{} proxy '{}' has port 0", self.type_name(), self.name);
        }

        match &self.protocol {
            ProxyProtocol::Vmess(o) => require("uuid", &o.uuid),
            ProxyProtocol::Vless(o) => {
                require("uuid", &o.uuid)?;
                if let Some(reality) = &o.reality_opts {
                    require("reality public-key", &reality.public_key)?;
                }
                Ok(())
            }
            ProxyProtocol::Shadowsocks(o) => {
                require("cipher", &o.cipher)?;
                require("password", &o.password)
            }
            ProxyProtocol::Trojan(o) => require("password", &o.password),
            ProxyProtocol::Hysteria(o) => require("auth-str", &o.auth_str),
            ProxyProtocol::Hysteria2(o) => require("password", &o.password),
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("missing required field '{}'", field);
    }
    Ok(())
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}:{}",
            self.name,
            self.type_name(),
            self.server,
            self.port
        )
    }
}

// ============================================================================
// Protocol Payloads
// ============================================================================

/// Protocol-specific payload of a proxy record
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ProxyProtocol {
    #[serde(rename = "vmess")]
    Vmess(VmessOptions),
    #[serde(rename = "vless")]
    Vless(VlessOptions),
    #[serde(rename = "ss")]
    Shadowsocks(ShadowsocksOptions),
    #[serde(rename = "trojan")]
    Trojan(TrojanOptions),
    #[serde(rename = "hysteria")]
    Hysteria(HysteriaOptions),
    #[serde(rename = "hysteria2")]
    Hysteria2(Hysteria2Options),
}

impl ProxyProtocol {
    pub fn type_name(&self) -> &'static str {
        match self {
            ProxyProtocol::Vmess(_) => "vmess",
            ProxyProtocol::Vless(_) => "vless",
            ProxyProtocol::Shadowsocks(_) => "ss",
            ProxyProtocol::Trojan(_) => "trojan",
            ProxyProtocol::Hysteria(_) => "hysteria",
            ProxyProtocol::Hysteria2(_) => "hysteria2",
        }
    }
}

/// VMess payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct VmessOptions {
    pub uuid: String,

    #[serde(rename = "alterId", default, deserialize_with = "u32_from_any")]
    pub alter_id: u32,

    #[serde(default = "default_vmess_cipher")]
    pub cipher: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default, skip_serializing_if = "is_false", deserialize_with = "bool_like")]
    pub tls: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servername: Option<String>,

    #[serde(default, skip_serializing_if = "is_false", deserialize_with = "bool_like")]
    pub skip_cert_verify: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h2_opts: Option<H2Options>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_opts: Option<GrpcOptions>,
}

fn default_vmess_cipher() -> String {
    "auto".to_string()
}

/// VLESS payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct VlessOptions {
    pub uuid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default, skip_serializing_if = "is_false", deserialize_with = "bool_like")]
    pub tls: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servername: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_fingerprint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,

    #[serde(default, skip_serializing_if = "is_false", deserialize_with = "bool_like")]
    pub skip_cert_verify: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reality_opts: Option<RealityOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_opts: Option<GrpcOptions>,
}

/// Shadowsocks payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ShadowsocksOptions {
    pub cipher: String,

    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_opts: Option<PluginOptions>,
}

/// Options of a SIP003 plugin in Clash form
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct PluginOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "is_false", deserialize_with = "bool_like")]
    pub tls: bool,
}

impl PluginOptions {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none() && self.host.is_none() && self.path.is_none() && !self.tls
    }
}

/// Trojan payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct TrojanOptions {
    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,

    #[serde(default, skip_serializing_if = "is_false", deserialize_with = "bool_like")]
    pub skip_cert_verify: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_opts: Option<GrpcOptions>,
}

/// Hysteria (v1) payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct HysteriaOptions {
    #[serde(alias = "auth_str")]
    pub auth_str: String,

    #[serde(default = "default_hysteria_protocol")]
    pub protocol: String,

    /// Upload bandwidth in Mbps
    #[serde(default = "default_bandwidth", deserialize_with = "mbps_from_any")]
    pub up: u32,

    /// Download bandwidth in Mbps
    #[serde(default = "default_bandwidth", deserialize_with = "mbps_from_any")]
    pub down: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,

    #[serde(default, skip_serializing_if = "is_false", deserialize_with = "bool_like")]
    pub skip_cert_verify: bool,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub alpn: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs: Option<String>,
}

/// Default Hysteria bandwidth (Mbps) when the link does not specify one
pub const DEFAULT_HYSTERIA_MBPS: u32 = 50;

fn default_hysteria_protocol() -> String {
    "udp".to_string()
}

fn default_bandwidth() -> u32 {
    DEFAULT_HYSTERIA_MBPS
}

/// Hysteria2 payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Hysteria2Options {
    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,

    #[serde(default, skip_serializing_if = "is_false", deserialize_with = "bool_like")]
    pub skip_cert_verify: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_fingerprint: Option<String>,

    /// Port hopping range, e.g. `20000-50000`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs_password: Option<String>,
}

// ============================================================================
// Transport Options
// ============================================================================

/// WebSocket transport options
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WsOptions {
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// HTTP/2 transport options
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct H2Options {
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub host: Vec<String>,
}

/// gRPC transport options
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct GrpcOptions {
    #[serde(rename = "grpc-service-name", default)]
    pub grpc_service_name: String,
}

/// REALITY options
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct RealityOptions {
    pub public_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

// ============================================================================
// Tests
// ============================================================================
