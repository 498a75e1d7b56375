//! Protocol parsers module
//!
//! One parser per share-link scheme, each implementing [`ProtocolParser`] and
//! producing a [`ProxyRecord`]. The [`ProtocolRegistry`] dispatches on the
//! (case-insensitive) scheme and validates every record it hands out.

mod hysteria;
mod hysteria2;
mod shadowsocks;
mod trojan;
mod vless;
mod vmess;

pub use hysteria::HysteriaParser;
pub use hysteria2::{Hysteria2Parser, SniRewrite};
pub use shadowsocks::{ShadowsocksParser, encode_shadowsocks_uri};
pub use trojan::TrojanParser;
pub use vless::VLessParser;
pub use vmess::VMessParser;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use tracing::debug;
use url::{Host, Url};

use crate::config::proxy::{GrpcOptions, H2Options, ProxyRecord, WsOptions};

/// Schemes understood by the built-in parsers
pub const KNOWN_SCHEMES: &[&str] = &[
    "vmess",
    "vless",
    "ss",
    "trojan",
    "hysteria",
    "hysteria2",
    "hy2",
];

// ============================================================================
// Protocol Parser Trait
// ============================================================================

/// Trait for parsing individual protocol URIs
pub trait ProtocolParser: Send + Sync {
    /// Returns the lowercase scheme this parser handles (e.g. "ss", "vmess")
    fn scheme(&self) -> &str;

    /// Parses a URI string into a proxy record
    fn parse(&self, uri: &str) -> Result<ProxyRecord>;

    /// Checks if this parser can handle the given URI
    fn can_parse(&self, uri: &str) -> bool {
        strip_scheme(uri, self.scheme()).is_some()
    }
}

// ============================================================================
// Protocol Registry
// ============================================================================

/// Registry for protocol parsers with dynamic dispatch
#[derive(Default)]
pub struct ProtocolRegistry {
    parsers: HashMap<String, Arc<dyn ProtocolParser>>,
}

impl ProtocolRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Creates a registry with all built-in parsers and the default SNI rewrite
    pub fn with_builtin_parsers() -> Self {
        Self::with_sni_rewrite(SniRewrite::default())
    }

    /// Creates a registry with all built-in parsers, rewriting Hysteria2 SNI
    /// values per `rewrite`
    pub fn with_sni_rewrite(rewrite: SniRewrite) -> Self {
        let rewrite = Arc::new(rewrite);
        let mut registry = Self::new();
        registry.register(Arc::new(ShadowsocksParser));
        registry.register(Arc::new(VMessParser));
        registry.register(Arc::new(VLessParser));
        registry.register(Arc::new(TrojanParser));
        registry.register(Arc::new(HysteriaParser));
        registry.register(Arc::new(Hysteria2Parser::new("hysteria2", rewrite.clone())));
        registry.register(Arc::new(Hysteria2Parser::new("hy2", rewrite)));
        registry
    }

    /// Registers a protocol parser
    pub fn register(&mut self, parser: Arc<dyn ProtocolParser>) {
        self.parsers
            .insert(parser.scheme().to_ascii_lowercase(), parser);
    }

    /// Gets a parser for the given scheme, ignoring case
    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn ProtocolParser>> {
        self.parsers.get(&scheme.to_ascii_lowercase())
    }

    /// Parses and validates a URI using the parser for its scheme
    pub fn parse_uri(&self, uri: &str) -> Result<ProxyRecord> {
        let uri = uri.trim();
        let scheme = extract_scheme(uri)?;

        let parser = self
            .get(scheme)
            .ok_or_else(|| anyhow!("Unsupported scheme: {}", scheme))?;

        let record = parser.parse(uri)?;
        record.validate()?;
        debug!("Parsed {} URI -> '{}'", scheme, record.name);
        Ok(record)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parses host:port string, handling IPv6 addresses in brackets
pub fn parse_host_port(hostport: &str) -> Result<(String, u16)> {
    let (host, port_str) = if let Some(rest) = hostport.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("Invalid IPv6 address: missing closing bracket"))?;
        let port_str = after
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("Missing port after IPv6 address"))?;
        (host, port_str)
    } else {
        hostport
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("Invalid host:port format: missing colon"))?
    };

    if host.is_empty() {
        bail!("Missing host in '{}'", hostport);
    }
    let port: u16 = port_str
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid port number: {}", port_str))?;
    if port == 0 {
        bail!("Invalid port number: 0");
    }

    Ok((host.to_string(), port))
}

/// Extracts the scheme from a URI
pub fn extract_scheme(uri: &str) -> Result<&str> {
    let (scheme, _) = uri
        .split_once("://")
        .ok_or_else(|| anyhow!("Invalid URI: missing scheme separator ://"))?;
    if scheme.is_empty() {
        bail!("Invalid URI: missing scheme");
    }
    Ok(scheme)
}

/// Strips `<scheme>://` from the front of `uri`, ignoring the scheme's case
pub fn strip_scheme<'a>(uri: &'a str, scheme: &str) -> Option<&'a str> {
    let (found, rest) = uri.split_once("://")?;
    found.eq_ignore_ascii_case(scheme).then_some(rest)
}

/// Server host of a parsed URL, without IPv6 brackets
pub(crate) fn host_string(url: &Url) -> Result<String> {
    match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => {
            Ok(super::text::percent_decode(domain))
        }
        Some(Host::Ipv4(addr)) => Ok(addr.to_string()),
        Some(Host::Ipv6(addr)) => Ok(addr.to_string()),
        _ => bail!("URI missing host"),
    }
}

/// Query parameters of a URL; the first occurrence of a key wins
pub(crate) fn query_params(url: &Url) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in url.query_pairs() {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

/// Percent-decoded user-info of a URL, `user:password` when both are present
pub(crate) fn user_info(url: &Url) -> String {
    let user = super::text::percent_decode(url.username());
    match url.password() {
        Some(password) => format!("{}:{}", user, super::text::percent_decode(password)),
        None => user,
    }
}

/// Display name of the URL fragment, percent-decoded
pub(crate) fn fragment_name(url: &Url) -> Option<String> {
    url.fragment()
        .map(|f| super::text::percent_decode(f).trim().to_string())
        .filter(|f| !f.is_empty())
}

/// Whether a flag parameter is switched on.
///
/// A present key counts as on unless its value is `0` or `false`.
pub(crate) fn flag_enabled(params: &HashMap<String, String>, keys: &[&str]) -> bool {
    keys.iter().any(|key| {
        params
            .get(*key)
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false"))
            .unwrap_or(false)
    })
}

/// First non-empty value among `keys`
pub(crate) fn first_param(params: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| params.get(*key))
        .find(|v| !v.is_empty())
        .cloned()
}

/// Name used when a link carries none: `<type>-<server>`
pub fn fallback_name(type_name: &str, server: &str) -> String {
    format!("{}-{}", type_name, server)
}

// ============================================================================
// Transport Options
// ============================================================================

/// Clash transport fields shared by vmess, vless and trojan
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Transport {
    pub network: Option<String>,
    pub ws_opts: Option<WsOptions>,
    pub h2_opts: Option<H2Options>,
    pub grpc_opts: Option<GrpcOptions>,
}

/// Builds transport options for `network`.
///
/// `tcp` (or nothing) is the implicit default and yields no options.
pub(crate) fn build_transport(
    network: Option<&str>,
    path: Option<&str>,
    host: Option<&str>,
    service_name: Option<&str>,
) -> Transport {
    let network = network.map(str::trim).unwrap_or("").to_ascii_lowercase();
    let path = path
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "/".to_string());
    let host = host.filter(|h| !h.is_empty()).map(str::to_string);

    match network.as_str() {
        "" | "tcp" => Transport::default(),
        "ws" => Transport {
            network: Some(network),
            ws_opts: Some(WsOptions {
                path,
                headers: host
                    .map(|h| [("Host".to_string(), h)].into_iter().collect())
                    .unwrap_or_default(),
            }),
            ..Default::default()
        },
        "h2" | "http" => Transport {
            network: Some("h2".to_string()),
            h2_opts: Some(H2Options {
                path,
                host: host.into_iter().collect(),
            }),
            ..Default::default()
        },
        "grpc" => Transport {
            network: Some(network),
            grpc_opts: Some(GrpcOptions {
                grpc_service_name: service_name.unwrap_or("").to_string(),
            }),
            ..Default::default()
        },
        _ => Transport {
            network: Some(network),
            ..Default::default()
        },
    }
}
