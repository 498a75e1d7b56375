use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::base::{BaseSettings, LogLevel, Mode};
use crate::config::dns::{DnsSettings, default_nameservers};
use crate::config::listener::{ListenerKind, PortBinding, PortMapping};
use crate::config::template::ReservedGroups;
use crate::parser::protocols::SniRewrite;

use super::fetcher::FetchSettings;
use super::helpers::{expand_tilde, fetch_text};

// ============================================================================
// Generator Config Types
// ============================================================================

/// Generator configuration parsed from TOML file
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GeneratorConfig {
    /// Template file path or URL, built-in template when absent
    #[serde(default)]
    pub template: Option<String>,

    /// Output file path, default "./config.yaml"
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub format: OutputFormat,

    /// Subscription URLs
    #[serde(default)]
    pub subscriptions: Vec<String>,

    /// Share-link URIs included as-is
    #[serde(default)]
    pub uris: Vec<String>,

    /// Replacement for the template rules
    #[serde(default)]
    pub rules: Option<Vec<String>>,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub base: BaseConfig,

    /// Labels of the groups that receive every proxy
    #[serde(default)]
    pub groups: ReservedGroups,

    #[serde(default)]
    pub port_mapping: Option<PortMappingConfig>,

    #[serde(default)]
    pub sni_rewrite: SniRewrite,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            template: None,
            output: default_output(),
            format: OutputFormat::default(),
            subscriptions: Vec::new(),
            uris: Vec::new(),
            rules: None,
            fetch: FetchSettings::default(),
            base: BaseConfig::default(),
            groups: ReservedGroups::default(),
            port_mapping: None,
            sni_rewrite: SniRewrite::default(),
        }
    }
}

/// Serialization of the generated document
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

/// `[base]` section, top-level settings of the generated document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BaseConfig {
    pub port: u16,
    pub socks_port: u16,
    pub mixed_port: Option<u16>,
    pub allow_lan: bool,
    pub mode: Mode,
    pub log_level: LogLevel,
    pub external_controller: String,
    pub ipv6: bool,
    pub nameservers: Vec<String>,
}

impl Default for BaseConfig {
    fn default() -> Self {
        let base = BaseSettings::default();
        Self {
            port: base.port,
            socks_port: base.socks_port,
            mixed_port: base.mixed_port,
            allow_lan: base.allow_lan,
            mode: base.mode,
            log_level: base.log_level,
            external_controller: base.external_controller,
            ipv6: base.dns.ipv6,
            nameservers: default_nameservers(),
        }
    }
}

impl BaseConfig {
    pub fn to_settings(&self) -> BaseSettings {
        BaseSettings {
            port: self.port,
            socks_port: self.socks_port,
            mixed_port: self.mixed_port,
            allow_lan: self.allow_lan,
            mode: self.mode,
            log_level: self.log_level,
            external_controller: self.external_controller.clone(),
            dns: DnsSettings {
                ipv6: self.ipv6,
                ..DnsSettings::default()
            }
            .with_nameservers(self.nameservers.clone()),
        }
    }
}

/// `[port_mapping]` section
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct PortMappingConfig {
    #[serde(default)]
    pub listener: ListenerKind,

    /// First port for proxies without an explicit binding
    #[serde(default)]
    pub start_port: Option<u16>,

    #[serde(default)]
    pub bindings: Vec<PortBinding>,
}

impl PortMappingConfig {
    /// Explicit bindings first, then consecutive free ports from
    /// `start_port` for every other proxy, in order.
    pub fn build(&self, proxy_names: &[String]) -> Result<PortMapping> {
        let mut mapping = PortMapping::new(self.listener);
        for binding in &self.bindings {
            mapping.insert(&binding.proxy, binding.port)?;
        }

        if let Some(start_port) = self.start_port {
            mapping.bind_sequential(proxy_names, start_port)?;
        }
        Ok(mapping)
    }
}

// ============================================================================
// Generator Implementation
// ============================================================================

impl GeneratorConfig {
    /// Parse generator config from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: GeneratorConfig =
            toml::from_str(content).context("Failed to parse generator config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks sources and sections that serde alone cannot
    pub fn validate(&self) -> Result<()> {
        if self.subscriptions.is_empty() && self.uris.is_empty() {
            bail!("At least one subscription or URI is required");
        }

        self.fetch.validate()?;

        if let Some(mapping) = &self.port_mapping
            && mapping.bindings.is_empty()
            && mapping.start_port.is_none()
        {
            bail!("port_mapping needs bindings or a start_port");
        }

        if let Some(rules) = &self.rules
            && rules.is_empty()
        {
            warn!("Replacement rule set is empty, generated config will only hold port rules");
        }

        Ok(())
    }

    /// Load generator config from file path
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read generator config from {:?}", path))?;
        Self::from_toml(&content)
    }

    /// Load generator config from file path or URL
    pub async fn load(path_or_url: &str) -> Result<Self> {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            Self::from_url(path_or_url).await
        } else {
            let expanded = expand_tilde(path_or_url);
            Self::from_file(Path::new(&expanded)).await
        }
    }

    /// Load generator config from URL
    pub async fn from_url(url: &str) -> Result<Self> {
        let content = fetch_text(url).await?;
        Self::from_toml(&content)
    }
}

fn default_output() -> String {
    "./config.yaml".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_TOML: &str = r#"
template = "~/templates/clash.yaml"
output = "./out/clash.json"
format = "json"
subscriptions = ["https://example.com/sub1", "https://example.com/sub2"]
uris = ["ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@1.2.3.4:8388#MyNode"]
rules = ["GEOIP,CN,DIRECT", "MATCH,Proxy"]

[fetch]
timeout_secs = 10
max_retries = 5
concurrency = 2
deadline_secs = 120

[base]
port = 8080
mixed_port = 7893
allow_lan = false
mode = "global"
log_level = "debug"
ipv6 = false
nameservers = ["1.1.1.1"]

[groups]
auto_select = "Auto"
node_select = "Proxy"

[port_mapping]
listener = "socks"
start_port = 42000

[[port_mapping.bindings]]
proxy = "MyNode"
port = 8001

[sni_rewrite]
patterns = ["bad.example"]
fallback = "good.example"
"#;

    #[test]
    fn test_parse_full_generator_config() {
        let config = GeneratorConfig::from_toml(FULL_TOML).unwrap();

        assert_eq!(config.template.as_deref(), Some("~/templates/clash.yaml"));
        assert_eq!(config.output, "./out/clash.json");
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.subscriptions.len(), 2);
        assert_eq!(config.uris.len(), 1);
        assert_eq!(config.rules.as_ref().unwrap().len(), 2);

        assert_eq!(config.fetch.timeout_secs, 10);
        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.fetch.concurrency, 2);
        assert_eq!(config.fetch.deadline_secs, Some(120));
        assert_eq!(config.fetch.retry_delay_min_ms, 1000);

        assert_eq!(config.groups.auto_select, "Auto");
        assert_eq!(config.groups.node_select, "Proxy");

        let mapping = config.port_mapping.as_ref().unwrap();
        assert_eq!(mapping.listener, ListenerKind::Socks);
        assert_eq!(mapping.start_port, Some(42000));
        assert_eq!(mapping.bindings[0].port, 8001);

        assert_eq!(config.sni_rewrite.patterns, vec!["bad.example"]);
        assert_eq!(config.sni_rewrite.fallback, "good.example");
    }

    #[test]
    fn test_parse_minimal_generator_config() {
        let config =
            GeneratorConfig::from_toml(r#"subscriptions = ["https://example.com/sub"]"#).unwrap();

        assert!(config.template.is_none());
        assert_eq!(config.output, "./config.yaml");
        assert_eq!(config.format, OutputFormat::Yaml);
        assert!(config.rules.is_none());
        assert!(config.port_mapping.is_none());
        assert_eq!(config.fetch, FetchSettings::default());
        assert_eq!(config.base, BaseConfig::default());
        assert_eq!(config.groups, ReservedGroups::default());
        assert_eq!(config.sni_rewrite, SniRewrite::default());
    }

    #[test]
    fn test_parse_uris_only() {
        let config = GeneratorConfig::from_toml(r#"uris = ["trojan://pw@h:443"]"#).unwrap();
        assert!(config.subscriptions.is_empty());
    }

    #[test]
    fn test_parse_no_sources_fails() {
        let result = GeneratorConfig::from_toml("subscriptions = []");
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("At least one subscription or URI is required")
        );
    }

    #[test]
    fn test_parse_invalid_format_fails() {
        let toml = r#"
format = "xml"
subscriptions = ["https://example.com/sub"]
"#;
        assert!(GeneratorConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_parse_invalid_fetch_fails() {
        let toml = r#"
subscriptions = ["https://example.com/sub"]

[fetch]
retry_delay_min_ms = 4000
retry_delay_max_ms = 1000
"#;
        assert!(GeneratorConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_parse_empty_port_mapping_fails() {
        let toml = r#"
subscriptions = ["https://example.com/sub"]

[port_mapping]
listener = "http"
"#;
        assert!(GeneratorConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_base_config_to_settings() {
        let config = GeneratorConfig::from_toml(FULL_TOML).unwrap();
        let settings = config.base.to_settings();

        assert_eq!(settings.port, 8080);
        assert_eq!(settings.socks_port, 7891);
        assert_eq!(settings.mixed_port, Some(7893));
        assert!(!settings.allow_lan);
        assert_eq!(settings.mode, Mode::Global);
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.external_controller, ":9090");
        assert!(!settings.dns.ipv6);
        assert_eq!(settings.dns.nameserver, vec!["1.1.1.1"]);
    }

    #[test]
    fn test_default_base_config_matches_settings() {
        assert_eq!(BaseConfig::default().to_settings(), BaseSettings::default());
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_port_mapping_explicit_only() {
        let config = PortMappingConfig {
            listener: ListenerKind::Http,
            start_port: None,
            bindings: vec![PortBinding {
                proxy: "B".to_string(),
                port: 9000,
            }],
        };
        let mapping = config.build(&names(&["A", "B"])).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.kind(), ListenerKind::Http);
    }

    #[test]
    fn test_port_mapping_sequential_skips_taken_ports() {
        let config = PortMappingConfig {
            listener: ListenerKind::Mixed,
            start_port: Some(8000),
            bindings: vec![PortBinding {
                proxy: "C".to_string(),
                port: 8001,
            }],
        };
        let mapping = config.build(&names(&["A", "B", "C", "D"])).unwrap();
        let bound: Vec<_> = mapping
            .bindings()
            .iter()
            .map(|b| (b.proxy.as_str(), b.port))
            .collect();
        assert_eq!(bound, vec![("C", 8001), ("A", 8000), ("B", 8002), ("D", 8003)]);
    }

    #[test]
    fn test_port_mapping_sequential_overflow() {
        let config = PortMappingConfig {
            listener: ListenerKind::Mixed,
            start_port: Some(65535),
            bindings: Vec::new(),
        };
        assert!(config.build(&names(&["A", "B"])).is_err());
    }

    #[test]
    fn test_port_mapping_duplicate_explicit_port_fails() {
        let config = PortMappingConfig {
            listener: ListenerKind::Mixed,
            start_port: None,
            bindings: vec![
                PortBinding {
                    proxy: "A".to_string(),
                    port: 8001,
                },
                PortBinding {
                    proxy: "B".to_string(),
                    port: 8001,
                },
            ],
        };
        assert!(config.build(&names(&["A", "B"])).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generator.toml");
        std::fs::write(&path, r#"uris = ["trojan://pw@h:443"]"#).unwrap();

        let config = GeneratorConfig::load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(config.uris.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        assert!(GeneratorConfig::load("/nonexistent/generator.toml").await.is_err());
    }
}
