//! Status aggregation.
//!
//! Every payload is computed from the committed registry and configuration
//! state at call time. Nothing is cached between queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::schema::GatewayConfig;
use crate::config::store::{ConfigStatus, ConfigStore};
use crate::routing::descriptor::DescriptorSummary;
use crate::routing::registry::{LoadResult, RouterRegistry, RouterStatus, ServiceView};

/// Summary state of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Loaded,
    Failed,
    /// No attempt has completed yet.
    Unknown,
}

impl From<&ServiceView> for ServiceStatus {
    fn from(view: &ServiceView) -> Self {
        match &view.last_result {
            Some(LoadResult::Loaded(_)) => ServiceStatus::Loaded,
            Some(LoadResult::Failed(_)) => ServiceStatus::Failed,
            None => ServiceStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayInfo {
    pub message: String,
    pub version: String,
    pub status: &'static str,
    pub services: BTreeMap<String, ServiceStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `healthy`, or `degraded` when any service is unhealthy.
    pub status: &'static str,
    pub gateway: &'static str,
    pub services: BTreeMap<String, ServiceHealth>,
}

/// Detailed point-in-time status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub gateway_config: GatewayConfig,
    pub router_status: RouterStatus,
    pub config_status: ConfigStatus,
    /// Whether each service has any composed configuration.
    pub service_configs: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceListing {
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceEntry {
    #[serde(flatten)]
    pub descriptor: DescriptorSummary,
    pub status: ServiceStatus,
    pub mounted: bool,
    /// Paths currently served under the prefix.
    pub endpoints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Builds status payloads from the registry and the configuration store.
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    registry: Arc<RouterRegistry>,
    config: Arc<ConfigStore>,
}

impl StatusAggregator {
    pub fn new(registry: Arc<RouterRegistry>, config: Arc<ConfigStore>) -> Self {
        Self { registry, config }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let service_configs = self
            .registry
            .descriptors()
            .map(|d| {
                let present = self.config.get_service_config(d.config_section_name()).is_some();
                (d.service_name().to_string(), present)
            })
            .collect();

        StatusSnapshot {
            gateway_config: self.config.get_gateway_config(),
            router_status: self.registry.get_status(),
            config_status: self.config.status(),
            service_configs,
        }
    }

    pub fn gateway_info(&self) -> GatewayInfo {
        let gateway = self.config.get_gateway_config();
        GatewayInfo {
            message: gateway.title,
            version: gateway.version,
            status: "running",
            services: self.service_statuses(),
        }
    }

    pub fn health(&self) -> HealthReport {
        let services: BTreeMap<String, ServiceHealth> = self
            .service_statuses()
            .into_iter()
            .map(|(name, status)| {
                let health = match status {
                    ServiceStatus::Loaded => ServiceHealth::Healthy,
                    _ => ServiceHealth::Unhealthy,
                };
                (name, health)
            })
            .collect();

        let degraded = services.values().any(|h| *h == ServiceHealth::Unhealthy);
        HealthReport {
            status: if degraded { "degraded" } else { "healthy" },
            gateway: "operational",
            services,
        }
    }

    pub fn service_listing(&self) -> ServiceListing {
        let mounts: BTreeMap<String, Vec<String>> = self
            .registry
            .mounts()
            .iter()
            .map(|m| {
                let paths = m.routes().paths().into_iter().map(str::to_string).collect();
                (m.service_name().to_string(), paths)
            })
            .collect();

        let services = self
            .registry
            .services()
            .iter()
            .map(|view| ServiceEntry {
                descriptor: DescriptorSummary::from(&view.descriptor),
                status: ServiceStatus::from(view),
                mounted: view.mounted,
                endpoints: mounts.get(view.descriptor.service_name()).cloned().unwrap_or_default(),
                error: view
                    .last_result
                    .as_ref()
                    .and_then(LoadResult::failure)
                    .map(ToString::to_string),
            })
            .collect();

        ServiceListing { services }
    }

    fn service_statuses(&self) -> BTreeMap<String, ServiceStatus> {
        self.registry
            .services()
            .iter()
            .map(|view| (view.descriptor.service_name().to_string(), ServiceStatus::from(view)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::ConfigOptions;
    use crate::module::{ModuleContext, ModuleExports, ModuleResolver};
    use crate::routing::descriptor::ServiceDescriptor;
    use crate::routing::filter::EndpointSelection;
    use crate::routing::registry::RegistryOptions;
    use crate::routing::route::{RouteCollection, RouteEntry};
    use serde_json::json;

    async fn ok() -> &'static str {
        "ok"
    }

    fn aggregator() -> StatusAggregator {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(
            &path,
            "[gateway]\nversion = \"2.0.0\"\nadmin_token = \"secret\"\n\n[services.users]\nlog_level = \"DEBUG\"\n",
        )
        .unwrap();
        let config = Arc::new(ConfigStore::load(ConfigOptions::from_file(&path), BTreeMap::new()).unwrap());

        let resolver = ModuleResolver::new();
        resolver.register("users", |_: &ModuleContext| -> anyhow::Result<ModuleExports> {
            let routes = RouteCollection::try_from_entries([
                RouteEntry::get("/users", ok)?,
                RouteEntry::get("/admin", ok)?,
            ])?;
            Ok(ModuleExports::new().with_routes("router", routes))
        });

        let registry = RouterRegistry::new(
            vec![
                ServiceDescriptor::new("users", "users").with_selection(EndpointSelection::exclude(["/admin"])),
                ServiceDescriptor::new("orders", "missing.toml"),
            ],
            Arc::new(resolver),
            Arc::clone(&config),
            RegistryOptions::default(),
        )
        .unwrap();

        StatusAggregator::new(Arc::new(registry), config)
    }

    #[tokio::test]
    async fn test_before_loading_is_unknown() {
        let aggregator = aggregator();
        let info = aggregator.gateway_info();
        assert_eq!(info.services["users"], ServiceStatus::Unknown);
        assert_eq!(aggregator.snapshot().router_status.total_loaded, 0);
    }

    #[tokio::test]
    async fn test_payloads_after_loading() {
        let aggregator = aggregator();
        aggregator.registry.load_all().await;

        let info = serde_json::to_value(aggregator.gateway_info()).unwrap();
        assert_eq!(info["version"], "2.0.0");
        assert_eq!(info["status"], "running");
        assert_eq!(info["services"], json!({ "users": "loaded", "orders": "failed" }));

        let health = aggregator.health();
        assert_eq!(health.status, "degraded");
        assert_eq!(health.services["users"], ServiceHealth::Healthy);
        assert_eq!(health.services["orders"], ServiceHealth::Unhealthy);

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.router_status.total_loaded, 1);
        assert_eq!(snapshot.router_status.total_failed, 1);
        assert_eq!(snapshot.service_configs["users"], true);
        assert_eq!(snapshot.service_configs["orders"], false);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["gateway_config"]["admin_token"], "********");
        assert_eq!(json["config_status"]["source"], "file");
    }

    #[tokio::test]
    async fn test_service_listing() {
        let aggregator = aggregator();
        aggregator.registry.load_all().await;

        let listing = serde_json::to_value(aggregator.service_listing()).unwrap();
        let users = &listing["services"][0];
        assert_eq!(users["name"], "users");
        assert_eq!(users["prefix"], "/users");
        assert_eq!(users["tags"], json!(["Users"]));
        assert_eq!(users["status"], "loaded");
        assert_eq!(users["mounted"], true);
        assert_eq!(users["endpoints"], json!(["/users"]));
        assert_eq!(users["excluded_endpoints"], json!(["/admin"]));
        assert!(users.get("included_endpoints").is_none());
        assert!(users.get("error").is_none());

        let orders = &listing["services"][1];
        assert_eq!(orders["status"], "failed");
        assert_eq!(orders["mounted"], false);
        assert!(orders["error"].as_str().unwrap().starts_with("path_not_found"));
    }
}
