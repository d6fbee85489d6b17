//! Service descriptors: how to locate and expose one backend.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::schema::MountConfig;
use crate::config::validation::ValidationError;
use crate::routing::filter::EndpointSelection;

/// Symbol looked up when a mount does not name one.
pub const DEFAULT_SYMBOL: &str = "router";

/// Immutable declaration of one mounted service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    service_name: String,
    module_path: String,
    router_symbol_name: String,
    url_prefix: String,
    tags: Vec<String>,
    selection: EndpointSelection,
    config_section_name: String,
}

impl ServiceDescriptor {
    /// Descriptor with every optional field at its default.
    pub fn new(service_name: impl Into<String>, module_path: impl Into<String>) -> Self {
        let service_name = service_name.into();
        Self {
            module_path: module_path.into(),
            router_symbol_name: DEFAULT_SYMBOL.to_string(),
            url_prefix: format!("/{service_name}"),
            tags: vec![title_case(&service_name)],
            selection: EndpointSelection::All,
            config_section_name: service_name.clone(),
            service_name,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.router_symbol_name = symbol.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_selection(mut self, selection: EndpointSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_config_section(mut self, section: impl Into<String>) -> Self {
        self.config_section_name = section.into();
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn router_symbol_name(&self) -> &str {
        &self.router_symbol_name
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn selection(&self) -> &EndpointSelection {
        &self.selection
    }

    pub fn include_endpoints(&self) -> Option<&BTreeSet<String>> {
        self.selection.included()
    }

    pub fn exclude_endpoints(&self) -> Option<&BTreeSet<String>> {
        self.selection.excluded()
    }

    pub fn config_section_name(&self) -> &str {
        &self.config_section_name
    }
}

impl TryFrom<MountConfig> for ServiceDescriptor {
    type Error = ValidationError;

    fn try_from(mount: MountConfig) -> Result<Self, Self::Error> {
        let selection = EndpointSelection::from_sets(mount.include_endpoints, mount.exclude_endpoints)
            .map_err(|_| ValidationError::ConflictingSelection {
                service: mount.service_name.clone(),
            })?;

        let mut descriptor = Self::new(mount.service_name, mount.module_path).with_selection(selection);
        if let Some(symbol) = mount.router_symbol_name {
            descriptor = descriptor.with_symbol(symbol);
        }
        if let Some(prefix) = mount.url_prefix {
            descriptor = descriptor.with_prefix(prefix);
        }
        if let Some(tags) = mount.tags {
            descriptor = descriptor.with_tags(tags);
        }
        if let Some(section) = mount.config_section_name {
            descriptor = descriptor.with_config_section(section);
        }
        Ok(descriptor)
    }
}

/// Listing view of a descriptor.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DescriptorSummary {
    pub name: String,
    pub prefix: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub included_endpoints: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_endpoints: Option<Vec<String>>,
}

impl From<&ServiceDescriptor> for DescriptorSummary {
    fn from(descriptor: &ServiceDescriptor) -> Self {
        Self {
            name: descriptor.service_name.clone(),
            prefix: descriptor.url_prefix.clone(),
            tags: descriptor.tags.clone(),
            included_endpoints: descriptor.include_endpoints().map(|s| s.iter().cloned().collect()),
            excluded_endpoints: descriptor.exclude_endpoints().map(|s| s.iter().cloned().collect()),
        }
    }
}

/// `user_service` → `User Service`.
fn title_case(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
