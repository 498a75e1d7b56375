//! Rule and group template
//!
//! A template supplies the `proxy-groups` and `rules` of the generated
//! document. It is read once, from a YAML file, a URL or the built-in
//! defaults, and never mutated afterwards; the assembler clones the groups
//! it fills in.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::group::ProxyGroup;
use crate::generator::helpers::{expand_tilde, fetch_text};

// ============================================================================
// Reserved Groups
// ============================================================================

/// Names of the two groups the assembler populates with proxies
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReservedGroups {
    /// Latency-tested group receiving every proxy
    #[serde(default = "default_auto_select")]
    pub auto_select: String,

    /// Manual selection group, keeps its static members and receives every proxy
    #[serde(default = "default_node_select")]
    pub node_select: String,
}

impl Default for ReservedGroups {
    fn default() -> Self {
        Self {
            auto_select: default_auto_select(),
            node_select: default_node_select(),
        }
    }
}

fn default_auto_select() -> String {
    "♻️ Auto Select".to_string()
}

fn default_node_select() -> String {
    "🚀 Node Select".to_string()
}

const DIRECT_GROUP: &str = "🎯 Direct";
const REJECT_GROUP: &str = "🛑 Reject";

// ============================================================================
// Template
// ============================================================================

/// Proxy groups and rules used as the skeleton of a generated document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Template {
    #[serde(rename = "proxy-groups", default)]
    pub proxy_groups: Vec<ProxyGroup>,

    #[serde(default)]
    pub rules: Vec<String>,
}

impl Template {
    /// Built-in groups and basic rules
    pub fn builtin(reserved: &ReservedGroups) -> Self {
        let auto = reserved.auto_select.clone();
        let node = reserved.node_select.clone();
        let direct = DIRECT_GROUP.to_string();
        let reject = REJECT_GROUP.to_string();

        let proxy_groups = vec![
            ProxyGroup::select(&node, vec![auto.clone(), "DIRECT".to_string()]),
            ProxyGroup::url_test(&auto, Vec::new()),
            ProxyGroup::select(
                "🌍 Streaming",
                vec![node.clone(), auto.clone(), direct.clone()],
            ),
            ProxyGroup::select("📲 Telegram", vec![node.clone(), direct.clone()]),
            ProxyGroup::select("Ⓜ️ Microsoft", vec![node.clone(), direct.clone()]),
            ProxyGroup::select("🍎 Apple", vec![node.clone(), direct.clone()]),
            ProxyGroup::select(
                &direct,
                vec!["DIRECT".to_string(), node.clone(), auto.clone()],
            ),
            ProxyGroup::select(&reject, vec!["REJECT".to_string(), "DIRECT".to_string()]),
            ProxyGroup::select("😈 Port Routing", vec![direct.clone(), node.clone()]),
        ];

        let rules = vec![
            format!("DOMAIN-SUFFIX,local,{}", direct),
            format!("DOMAIN-SUFFIX,cn,{}", direct),
            format!("IP-CIDR,127.0.0.0/8,{},no-resolve", direct),
            format!("IP-CIDR,192.168.0.0/16,{},no-resolve", direct),
            format!("GEOIP,CN,{}", direct),
            format!("MATCH,{}", node),
        ];

        Self {
            proxy_groups,
            rules,
        }
    }

    /// Parse a template from YAML, falling back to the built-in template when
    /// either groups or rules are missing.
    pub fn from_yaml_str(content: &str, reserved: &ReservedGroups) -> Result<Self> {
        let template: Template =
            serde_yaml::from_str(content).context("Failed to parse template YAML")?;

        if template.proxy_groups.is_empty() || template.rules.is_empty() {
            warn!("Template lacks proxy-groups or rules, using the built-in template");
            return Ok(Self::builtin(reserved));
        }

        info!(
            "Loaded template: {} proxy groups, {} rules",
            template.proxy_groups.len(),
            template.rules.len()
        );
        Ok(template)
    }

    /// Load a template from a file path or URL.
    ///
    /// A missing file yields the built-in template.
    pub async fn load(path_or_url: &str, reserved: &ReservedGroups) -> Result<Self> {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            let content = fetch_text(path_or_url).await?;
            return Self::from_yaml_str(&content, reserved);
        }

        let expanded = expand_tilde(path_or_url);
        let path = Path::new(&expanded);
        if !path.exists() {
            warn!(
                "Template file {:?} does not exist, using the built-in template",
                path
            );
            return Ok(Self::builtin(reserved));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read template from {:?}", path))?;
        Self::from_yaml_str(&content, reserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::group::GroupType;

    #[test]
    fn test_builtin_contains_reserved_groups() {
        let reserved = ReservedGroups::default();
        let template = Template::builtin(&reserved);

        let node = &template.proxy_groups[0];
        assert_eq!(node.name, reserved.node_select);
        assert_eq!(node.group_type, GroupType::Select);
        assert_eq!(node.proxies, vec![reserved.auto_select.clone(), "DIRECT".to_string()]);

        let auto = &template.proxy_groups[1];
        assert_eq!(auto.name, reserved.auto_select);
        assert_eq!(auto.group_type, GroupType::UrlTest);
        assert!(auto.proxies.is_empty());
    }

    #[test]
    fn test_builtin_rules_end_with_match() {
        let reserved = ReservedGroups::default();
        let template = Template::builtin(&reserved);
        assert_eq!(
            template.rules.last().unwrap(),
            &format!("MATCH,{}", reserved.node_select)
        );
        assert!(!template.rules.iter().any(|r| r.starts_with("DST-PORT,")));
    }

    #[test]
    fn test_from_yaml_complete_template() {
        let yaml = r#"
port: 7890
proxy-groups:
  - name: Proxy
    type: select
    proxies: [DIRECT]
rules:
  - MATCH,Proxy
"#;
        let template = Template::from_yaml_str(yaml, &ReservedGroups::default()).unwrap();
        assert_eq!(template.proxy_groups.len(), 1);
        assert_eq!(template.rules, vec!["MATCH,Proxy"]);
    }

    #[test]
    fn test_from_yaml_missing_rules_uses_builtin() {
        let yaml = "proxy-groups:\n  - name: Proxy\n    type: select\n";
        let reserved = ReservedGroups::default();
        let template = Template::from_yaml_str(yaml, &reserved).unwrap();
        assert_eq!(template, Template::builtin(&reserved));
    }

    #[test]
    fn test_from_yaml_invalid() {
        assert!(Template::from_yaml_str("proxy-groups: [", &ReservedGroups::default()).is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_builtin() {
        let reserved = ReservedGroups::default();
        let template = Template::load("/nonexistent/template.yaml", &reserved)
            .await
            .unwrap();
        assert_eq!(template, Template::builtin(&reserved));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.yaml");
        std::fs::write(
            &path,
            "proxy-groups:\n  - name: P\n    type: select\n    proxies: [DIRECT]\nrules:\n  - MATCH,P\n",
        )
        .unwrap();

        let template = Template::load(path.to_str().unwrap(), &ReservedGroups::default())
            .await
            .unwrap();
        assert_eq!(template.proxy_groups[0].name, "P");
    }
}
