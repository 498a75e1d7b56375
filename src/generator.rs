//! Configuration generator module
//!
//! This module orchestrates the generation of Clash configuration files
//! from a template and subscription sources.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::GeneratedConfig;
use crate::config::template::Template;
use crate::parser::protocols::ProtocolRegistry;
use crate::transform::uniquify_names;

// Sub-modules
pub mod assembler;
pub mod fetcher;
pub mod generator_config;
pub mod helpers;
pub mod subscription;

// Re-exports
pub use assembler::{ConfigAssembler, GenerateError};
pub use fetcher::{FetchSettings, SubscriptionFetcher};
pub use generator_config::{GeneratorConfig, OutputFormat};
pub use helpers::{expand_tilde, fetch_text, write_output};
pub use subscription::{SubscriptionSession, SubscriptionSource};

// ============================================================================
// Generator
// ============================================================================

/// Generator that orchestrates the config generation process
pub struct Generator {
    config: GeneratorConfig,
    fetcher: SubscriptionFetcher,
    registry: ProtocolRegistry,
}

impl Generator {
    /// Create a new generator with the given config
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let fetcher = SubscriptionFetcher::new(config.fetch.clone())?;
        let registry = ProtocolRegistry::with_sni_rewrite(config.sni_rewrite.clone());
        Ok(Self {
            config,
            fetcher,
            registry,
        })
    }

    /// Load generator from path or URL
    pub async fn load(path_or_url: &str) -> Result<Self> {
        let config = GeneratorConfig::load(path_or_url).await?;
        Self::new(config)
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Run the generation process
    pub async fn generate(&self) -> Result<GeneratedConfig> {
        info!("Starting config generation");

        // 1. Load template
        let template = self.load_template().await?;

        // 2. Fetch and decode every source
        let session = self.collect_sources().await;
        session.log_summary();

        // 3. Make names unique across all sources
        let mut records = session.into_records();
        uniquify_names(&mut records);

        // 4. Assemble
        let mut assembler = ConfigAssembler::new(template)
            .with_base(self.config.base.to_settings())
            .with_reserved_groups(self.config.groups.clone());
        if let Some(rules) = &self.config.rules {
            assembler = assembler.with_rules(rules.clone());
        }
        if let Some(mapping_config) = &self.config.port_mapping {
            let names: Vec<String> = records.iter().map(|r| r.name.clone()).collect();
            let mapping = mapping_config
                .build(&names)
                .context("Invalid port mapping")?;
            info!(
                "Mapping {} proxies to {} listeners",
                mapping.len(),
                mapping.kind()
            );
            assembler = assembler.with_port_mapping(mapping);
        }

        let config = assembler.assemble(&records)?;
        info!("Final config has {} proxies", config.proxies.len());
        Ok(config)
    }

    /// Generate and write to output file
    pub async fn generate_to_file(&self, output_override: Option<&str>) -> Result<()> {
        let config = self.generate().await?;

        let output_path = output_override.unwrap_or(&self.config.output);
        let content = match self.config.format {
            OutputFormat::Yaml => config
                .to_yaml()
                .context("Failed to serialize config to YAML")?,
            OutputFormat::Json => config
                .to_json_pretty()
                .context("Failed to serialize config to JSON")?,
        };

        write_output(output_path, &content).await?;
        info!("Config written to {}", output_path);
        Ok(())
    }

    /// Load the template, built-in when none is configured
    async fn load_template(&self) -> Result<Template> {
        match &self.config.template {
            Some(path_or_url) => {
                info!("Loading template from {}", path_or_url);
                Template::load(path_or_url, &self.config.groups).await
            }
            None => {
                info!("No template configured, using the built-in template");
                Ok(Template::builtin(&self.config.groups))
            }
        }
    }

    /// Fetch subscriptions with bounded concurrency, then add literal URIs.
    ///
    /// Sources keep input order. With a deadline, sources still pending when
    /// it passes contribute no records.
    async fn collect_sources(&self) -> SubscriptionSession {
        let urls = &self.config.subscriptions;
        let mut session = SubscriptionSession::new();

        if !urls.is_empty() {
            let pool = urls.len().min(self.fetcher.settings().concurrency).max(1);
            debug!("Fetching {} subscription(s), {} at a time", urls.len(), pool);

            let mut pending = stream::iter(urls.iter().enumerate())
                .map(|(index, url)| async move {
                    info!("Fetching subscription [{}/{}]: {}", index + 1, urls.len(), url);
                    match self.fetcher.fetch(url).await {
                        Some(content) => SubscriptionSource::from_content(
                            url.as_str(),
                            content,
                            &self.registry,
                        ),
                        None => SubscriptionSource::unreachable(url.as_str()),
                    }
                })
                .buffered(pool);

            let mut finished = Vec::with_capacity(urls.len());
            match self.fetcher.settings().deadline() {
                Some(deadline) => {
                    let drained = tokio::time::timeout(deadline, async {
                        while let Some(source) = pending.next().await {
                            finished.push(source);
                        }
                    })
                    .await;
                    if drained.is_err() {
                        warn!(
                            "Fetch deadline of {:?} passed, {} source(s) unfinished",
                            deadline,
                            urls.len() - finished.len()
                        );
                    }
                }
                None => {
                    while let Some(source) = pending.next().await {
                        finished.push(source);
                    }
                }
            }

            for url in urls.iter().skip(finished.len()) {
                finished.push(SubscriptionSource::unreachable(url.as_str()));
            }
            for source in finished {
                session.upsert(source);
            }
        }

        if !self.config.uris.is_empty() {
            session.upsert(SubscriptionSource::literal(&self.config.uris, &self.registry));
        }

        session
    }
}

// ============================================================================
// Tests
// ============================================================================
