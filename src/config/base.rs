//! Top-level settings of the generated Clash document
//!
//! These are independent of proxy content and always come from defaults or
//! the generator config.

use serde::{Deserialize, Serialize};

use crate::config::dns::DnsSettings;

/// Base settings written at the top of every generated document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct BaseSettings {
    /// HTTP proxy port
    pub port: u16,

    /// SOCKS5 proxy port
    pub socks_port: u16,

    /// Mixed HTTP/SOCKS port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixed_port: Option<u16>,

    pub allow_lan: bool,

    pub mode: Mode,

    pub log_level: LogLevel,

    /// RESTful controller address
    pub external_controller: String,

    pub dns: DnsSettings,
}

impl Default for BaseSettings {
    fn default() -> Self {
        Self {
            port: 7890,
            socks_port: 7891,
            mixed_port: None,
            allow_lan: true,
            mode: Mode::Rule,
            log_level: LogLevel::Info,
            external_controller: ":9090".to_string(),
            dns: DnsSettings::default(),
        }
    }
}

/// Routing mode
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Rule,
    Global,
    Direct,
}

/// Log level of the router
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Silent,
}
