use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::base::BaseSettings;
use crate::config::group::ProxyGroup;
use crate::config::listener::Listener;
use crate::config::proxy::ProxyRecord;

pub mod base;
pub mod dns;
pub mod group;
pub mod listener;
pub mod proxy;
pub mod template;
pub mod util;

/// Generated Clash configuration document
///
/// Produced fresh by every assembly. Base settings are flattened to the top
/// level, followed by proxies, groups, rules, optional listeners and meta.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GeneratedConfig {
    #[serde(flatten)]
    pub base: BaseSettings,

    #[serde(default)]
    pub proxies: Vec<ProxyRecord>,

    #[serde(rename = "proxy-groups", default)]
    pub proxy_groups: Vec<ProxyGroup>,

    /// Rules, port rules first
    #[serde(default)]
    pub rules: Vec<String>,

    /// Present only when a port mapping was applied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<Listener>,

    pub meta: GenerationMeta,
}

/// Provenance of a generated document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GenerationMeta {
    /// Local creation time, `YYYY-MM-DD HH:MM:SS`
    pub created: String,

    pub generator: String,
}

impl GenerationMeta {
    pub fn at(time: DateTime<Local>) -> Self {
        Self {
            created: time.format("%Y-%m-%d %H:%M:%S").to_string(),
            generator: format!("clashgen {}", crate::get_version()),
        }
    }

    pub fn now() -> Self {
        Self::at(Local::now())
    }
}

impl GeneratedConfig {
    /// Proxy names in document order
    pub fn proxy_names(&self) -> Vec<&str> {
        self.proxies.iter().map(|p| p.name.as_str()).collect()
    }

    /// Serialize the document to YAML
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Serialize the document to a pretty-printed JSON string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a document from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}
