use serde::{Deserialize, Serialize};

/// Proxy group of the generated document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProxyGroup {
    pub name: String,

    #[serde(rename = "type")]
    pub group_type: GroupType,

    /// Member names, proxies or other groups
    #[serde(default)]
    pub proxies: Vec<String>,

    /// Health check URL (url-test only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Health check interval in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,

    /// Latency tolerance in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<u32>,
}

/// Group selection strategy
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum GroupType {
    Select,
    UrlTest,
}

pub const DEFAULT_TEST_URL: &str = "http://www.gstatic.com/generate_204";

impl ProxyGroup {
    /// Create a manual selection group
    pub fn select(name: impl Into<String>, proxies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            group_type: GroupType::Select,
            proxies,
            url: None,
            interval: None,
            tolerance: None,
        }
    }

    /// Create a latency-tested group with the default health check
    pub fn url_test(name: impl Into<String>, proxies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            group_type: GroupType::UrlTest,
            proxies,
            url: Some(DEFAULT_TEST_URL.to_string()),
            interval: Some(300),
            tolerance: Some(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_group_serialization() {
        let group = ProxyGroup::select("Node Select", vec!["DIRECT".to_string()]);
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["type"], "select");
        assert!(json.get("url").is_none());
    }

    #[test]
    fn test_url_test_group_serialization() {
        let group = ProxyGroup::url_test("Auto", Vec::new());
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["type"], "url-test");
        assert_eq!(json["url"], DEFAULT_TEST_URL);
        assert_eq!(json["interval"], 300);
        assert_eq!(json["tolerance"], 50);
    }

    #[test]
    fn test_group_deserialization_without_members() {
        let group: ProxyGroup = serde_yaml::from_str("name: G\ntype: select\n").unwrap();
        assert!(group.proxies.is_empty());
        assert_eq!(group.group_type, GroupType::Select);
    }

    #[test]
    fn test_group_rejects_unknown_type() {
        assert!(serde_yaml::from_str::<ProxyGroup>("name: G\ntype: load-balance\n").is_err());
    }
}
