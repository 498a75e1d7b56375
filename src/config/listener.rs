//! Port-to-proxy listeners
//!
//! A [`PortMapping`] binds local ports to proxies. Each binding becomes one
//! listener of the mapping's kind plus one `DST-PORT` rule.

use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

// ============================================================================
// Listener
// ============================================================================

/// Inbound listener kind
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    /// HTTP and SOCKS5 on one port
    #[default]
    Mixed,
    Http,
    Socks,
}

impl ListenerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerKind::Mixed => "mixed",
            ListenerKind::Http => "http",
            ListenerKind::Socks => "socks",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listener entry of the generated document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Listener {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: ListenerKind,

    pub port: u16,

    /// Proxy all traffic of this listener is sent to
    pub proxy: String,
}

// ============================================================================
// Port Mapping
// ============================================================================

/// One `proxy -> port` binding
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PortBinding {
    pub proxy: String,
    pub port: u16,
}

/// Ordered proxy-to-port bindings sharing one listener kind.
///
/// At most one binding per port and per proxy.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PortMapping {
    kind: ListenerKind,
    bindings: Vec<PortBinding>,
}

impl PortMapping {
    pub fn new(kind: ListenerKind) -> Self {
        Self {
            kind,
            bindings: Vec::new(),
        }
    }

    /// Bind every name not yet mapped to the next free port, counting up
    /// from `start_port`. Ports already owned by a binding are skipped.
    pub fn bind_sequential(&mut self, names: &[String], start_port: u16) -> Result<()> {
        let mut next = Some(start_port).filter(|p| *p != 0);
        for name in names {
            if self.bindings.iter().any(|b| &b.proxy == name) {
                continue;
            }
            let port = loop {
                match next {
                    Some(p) if self.bindings.iter().any(|b| b.port == p) => {
                        next = p.checked_add(1);
                    }
                    Some(p) => break p,
                    None => bail!(
                        "Port range starting at {} cannot hold {} proxies",
                        start_port,
                        names.len()
                    ),
                }
            };
            self.insert(name, port)?;
            next = port.checked_add(1);
        }
        Ok(())
    }

    /// Bind `proxy` to `port`.
    ///
    /// Re-binding an already mapped proxy moves it to the new port in place.
    /// A port already owned by another proxy is an error.
    pub fn insert(&mut self, proxy: &str, port: u16) -> Result<()> {
        if port == 0 {
            bail!("Cannot map proxy '{}' to port 0", proxy);
        }
        if let Some(owner) = self
            .bindings
            .iter()
            .find(|b| b.port == port && b.proxy != proxy)
        {
            bail!(
                "Port {} is already mapped to proxy '{}'",
                port,
                owner.proxy
            );
        }

        match self.bindings.iter_mut().find(|b| b.proxy == proxy) {
            Some(existing) => existing.port = port,
            None => self.bindings.push(PortBinding {
                proxy: proxy.to_string(),
                port,
            }),
        }
        Ok(())
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn bindings(&self) -> &[PortBinding] {
        &self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }
}

/// `DST-PORT,<port>,<proxy>` rule for a binding
pub fn port_rule(binding: &PortBinding) -> String {
    format!("DST-PORT,{},{}", binding.port, binding.proxy)
}

/// Whether a rule is a destination-port rule, in any case or spacing
pub fn is_port_rule(rule: &str) -> bool {
    rule.split(',')
        .next()
        .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("DST-PORT"))
}
