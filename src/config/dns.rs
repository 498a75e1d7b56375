use serde::{Deserialize, Serialize};

use crate::config::util::{default_true, is_false};

/// DNS section of the generated Clash document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DnsSettings {
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Local DNS listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub ipv6: bool,

    #[serde(default)]
    pub enhanced_mode: EnhancedMode,

    /// Upstream resolvers
    #[serde(default = "default_nameservers")]
    pub nameserver: Vec<String>,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            enable: true,
            listen: default_listen(),
            ipv6: true,
            enhanced_mode: EnhancedMode::default(),
            nameserver: default_nameservers(),
        }
    }
}

impl DnsSettings {
    /// Replace the upstream resolvers, keeping the defaults when `nameservers` is empty
    pub fn with_nameservers(mut self, nameservers: Vec<String>) -> Self {
        if !nameservers.is_empty() {
            self.nameserver = nameservers;
        }
        self
    }
}

/// DNS enhanced mode
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EnhancedMode {
    #[default]
    FakeIp,
    RedirHost,
}

fn default_listen() -> String {
    "0.0.0.0:53".to_string()
}

pub fn default_nameservers() -> Vec<String> {
    vec![
        "114.114.114.114".to_string(),
        "8.8.8.8".to_string(),
        "223.5.5.5".to_string(),
    ]
}
