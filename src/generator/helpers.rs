//! Generator utility functions
//!
//! Path expansion, one-shot HTTP fetching for templates and generator
//! configs, and output file writing.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::get_version;

// ============================================================================
// Path Utilities
// ============================================================================

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = dirs_home()
    {
        return path.replacen("~", &home, 1);
    }
    path.to_string()
}

/// Get home directory path
pub fn dirs_home() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok()
    }
}

// ============================================================================
// HTTP Utilities
// ============================================================================

/// Fetch text content from a URL
pub async fn fetch_text(url: &str) -> Result<String> {
    debug!("Fetching URL: {}", url);

    let client = reqwest::Client::builder()
        .user_agent(format!("clashgen/{}", get_version()))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch URL: {}", url))?;

    let status = response.status();
    if !status.is_success() {
        bail!("HTTP request failed with status {}: {}", status, url);
    }

    let text = response
        .text()
        .await
        .with_context(|| format!("Failed to read response body from: {}", url))?;

    Ok(text)
}

// ============================================================================
// File Output
// ============================================================================

/// Write `content` to `path` (with `~` expanded), creating parent directories
pub async fn write_output(path: &str, content: &str) -> Result<()> {
    let expanded = expand_tilde(path);
    let path = Path::new(&expanded);

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }

    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write output to {:?}", path))?;
    info!("Wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_expand_tilde_with_home() {
        if let Ok(home) = env::var("HOME") {
            let expanded = expand_tilde("~/test/path");
            assert!(expanded.starts_with(&home));
            assert!(expanded.ends_with("/test/path"));
            assert!(!expanded.contains('~'));
        }
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        if let Ok(home) = env::var("HOME") {
            let expanded = expand_tilde("~");
            assert_eq!(expanded, home);
        }
    }

    #[test]
    fn test_expand_tilde_no_tilde() {
        let path = "/absolute/path/to/file";
        let expanded = expand_tilde(path);
        assert_eq!(expanded, path);
    }

    #[test]
    fn test_expand_tilde_relative_path() {
        let path = "./relative/path";
        let expanded = expand_tilde(path);
        assert_eq!(expanded, path);
    }

    #[test]
    fn test_expand_tilde_tilde_in_middle() {
        // Tilde in the middle should not be expanded
        let path = "/some/~/path";
        let expanded = expand_tilde(path);
        assert_eq!(expanded, path);
    }

    #[test]
    fn test_expand_tilde_absolute_path() {
        let path = "/usr/local/bin";
        let expanded = expand_tilde(path);
        assert_eq!(expanded, path);
    }

    #[test]
    fn test_dirs_home_returns_some() {
        // HOME should be set in most test environments
        if env::var("HOME").is_ok() || env::var("USERPROFILE").is_ok() {
            assert!(dirs_home().is_some());
        }
    }

    #[tokio::test]
    async fn test_write_output_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/config.yaml");
        write_output(path.to_str().unwrap(), "port: 7890\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "port: 7890\n");
    }

    #[tokio::test]
    async fn test_fetch_text_non_success() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetch_text(&server.uri()).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
