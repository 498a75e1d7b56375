//! Final document assembly
//!
//! [`ConfigAssembler`] owns everything that does not depend on proxy content
//! (base settings, template, reserved group names, replacement rules, port
//! mapping) and turns a record set into a fresh [`GeneratedConfig`]. Assembly
//! is deterministic apart from `meta.created`.

use std::collections::HashSet;

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::base::BaseSettings;
use crate::config::group::ProxyGroup;
use crate::config::listener::{Listener, PortMapping, is_port_rule, port_rule};
use crate::config::proxy::ProxyRecord;
use crate::config::template::{ReservedGroups, Template};
use crate::config::{GeneratedConfig, GenerationMeta};

/// Failure the caller of a generation run is expected to handle
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("no usable proxies: every source was unreachable, empty or undecodable")]
    NoUsableProxies,
}

// ============================================================================
// Config Assembler
// ============================================================================

/// Builds generated documents from decoded records
#[derive(Clone, Debug)]
pub struct ConfigAssembler {
    base: BaseSettings,
    template: Template,
    reserved: ReservedGroups,
    rules_override: Option<Vec<String>>,
    port_mapping: Option<PortMapping>,
}

impl ConfigAssembler {
    pub fn new(template: Template) -> Self {
        Self {
            base: BaseSettings::default(),
            template,
            reserved: ReservedGroups::default(),
            rules_override: None,
            port_mapping: None,
        }
    }

    pub fn with_base(mut self, base: BaseSettings) -> Self {
        self.base = base;
        self
    }

    pub fn with_reserved_groups(mut self, reserved: ReservedGroups) -> Self {
        self.reserved = reserved;
        self
    }

    /// Use `rules` instead of the template rules
    pub fn with_rules(mut self, rules: Vec<String>) -> Self {
        self.rules_override = Some(rules);
        self
    }

    pub fn with_port_mapping(mut self, mapping: PortMapping) -> Self {
        self.port_mapping = Some(mapping);
        self
    }

    /// Assemble a document stamped with the current time
    pub fn assemble(&self, records: &[ProxyRecord]) -> Result<GeneratedConfig, GenerateError> {
        self.assemble_at(records, Local::now())
    }

    /// Assemble a document stamped with `created`
    pub fn assemble_at(
        &self,
        records: &[ProxyRecord],
        created: DateTime<Local>,
    ) -> Result<GeneratedConfig, GenerateError> {
        if records.is_empty() {
            return Err(GenerateError::NoUsableProxies);
        }

        let names: Vec<String> = records.iter().map(|r| r.name.clone()).collect();
        let proxy_groups = self.fill_groups(&names);
        let (listeners, port_rules) = self.listeners_and_port_rules(&names);

        let mut rules = port_rules;
        rules.extend(
            self.rules_override
                .as_ref()
                .unwrap_or(&self.template.rules)
                .iter()
                .filter(|rule| {
                    let keep = !is_port_rule(rule);
                    if !keep {
                        debug!("Dropping template port rule {:?}", rule);
                    }
                    keep
                })
                .cloned(),
        );

        info!(
            "Assembled config: {} proxies, {} groups, {} rules, {} listeners",
            records.len(),
            proxy_groups.len(),
            rules.len(),
            listeners.len()
        );

        Ok(GeneratedConfig {
            base: self.base.clone(),
            proxies: records.to_vec(),
            proxy_groups,
            rules,
            listeners,
            meta: GenerationMeta::at(created),
        })
    }

    /// Template groups with the reserved ones populated
    fn fill_groups(&self, names: &[String]) -> Vec<ProxyGroup> {
        let mut groups = self.template.proxy_groups.clone();
        let mut found_auto = false;
        let mut found_node = false;

        for group in &mut groups {
            if group.name == self.reserved.auto_select {
                group.proxies = names.to_vec();
                found_auto = true;
            } else if group.name == self.reserved.node_select {
                let proxy_names: HashSet<&String> = names.iter().collect();
                group.proxies.retain(|member| !proxy_names.contains(member));
                group.proxies.extend(names.iter().cloned());
                found_node = true;
            }
        }

        if !found_auto {
            warn!(
                "Template has no group '{}', proxies not added to an auto-select group",
                self.reserved.auto_select
            );
        }
        if !found_node {
            warn!(
                "Template has no group '{}', proxies not added to a node-select group",
                self.reserved.node_select
            );
        }
        groups
    }

    /// One listener and one `DST-PORT` rule per binding whose proxy exists
    fn listeners_and_port_rules(&self, names: &[String]) -> (Vec<Listener>, Vec<String>) {
        let Some(mapping) = &self.port_mapping else {
            return (Vec::new(), Vec::new());
        };

        let known: HashSet<&str> = names.iter().map(String::as_str).collect();
        let kind = mapping.kind();
        let mut listeners = Vec::with_capacity(mapping.len());
        let mut rules = Vec::with_capacity(mapping.len());

        for binding in mapping.bindings() {
            if !known.contains(binding.proxy.as_str()) {
                warn!(
                    "Port {} is mapped to unknown proxy '{}', skipping",
                    binding.port, binding.proxy
                );
                continue;
            }
            listeners.push(Listener {
                name: format!("{}{}", kind, listeners.len()),
                kind,
                port: binding.port,
                proxy: binding.proxy.clone(),
            });
            rules.push(port_rule(binding));
        }

        (listeners, rules)
    }
}
