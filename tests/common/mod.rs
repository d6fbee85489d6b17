//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use service_gateway::config::{descriptors_from_mounts, ConfigError, ConfigOptions, ConfigStore};
use service_gateway::lifecycle::Shutdown;
use service_gateway::module::ModuleResolver;
use service_gateway::routing::{RegistryOptions, RouterRegistry};
use service_gateway::GatewayServer;

/// Write `content` to `dir/relative`, creating parent directories.
pub fn write_file(dir: &Path, relative: &str, content: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// A gateway serving on an ephemeral local port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub registry: Arc<RouterRegistry>,
    pub config: Arc<ConfigStore>,
    pub dir: TempDir,
    client: reqwest::Client,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        read(res).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>) -> (u16, Value) {
        let mut req = self.client.post(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        read(req.send().await.unwrap()).await
    }

    pub async fn request(&self, method: reqwest::Method, path: &str) -> reqwest::Response {
        self.client.request(method, self.url(path)).send().await.unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap().unwrap();
    }
}

async fn read(res: reqwest::Response) -> (u16, Value) {
    let status = res.status().as_u16();
    let text = res.text().await.unwrap();
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, body)
}

/// Start a gateway the way the binary does, from a config file in `dir`.
///
/// `env` replaces the process environment, and `setup` registers linked
/// modules before anything is loaded.
pub async fn start_gateway(
    dir: TempDir,
    config_toml: &str,
    env: BTreeMap<String, String>,
    setup: impl FnOnce(&ModuleResolver),
) -> Result<TestGateway, ConfigError> {
    let config_path = write_file(dir.path(), "gateway.toml", config_toml);
    let config = Arc::new(ConfigStore::load(ConfigOptions::from_file(&config_path), env)?);
    let gateway = config.get_gateway_config();

    let descriptors = descriptors_from_mounts(config.current().mounts()).map_err(ConfigError::Validation)?;
    let resolver = ModuleResolver::new().with_base_dir(dir.path());
    setup(&resolver);

    let registry = Arc::new(RouterRegistry::new(
        descriptors,
        Arc::new(resolver),
        Arc::clone(&config),
        RegistryOptions::from_gateway(&gateway),
    )?);
    registry.load_all().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = GatewayServer::new(Arc::clone(&registry), Arc::clone(&config));
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    Ok(TestGateway {
        addr,
        registry,
        config,
        dir,
        client: reqwest::Client::new(),
        shutdown,
        handle,
    })
}

pub const USERS_MANIFEST: &str = r#"
[[router.routes]]
path = "/"
body = { users = ["alice", "bob"] }

[[router.routes]]
path = "/profile"

[[router.routes]]
path = "/admin"
body = { secret = true }
"#;

pub const AUTH_MANIFEST: &str = r#"
[[router.routes]]
path = "/login"
methods = ["POST"]
body = { token = "t" }

[[router.routes]]
path = "/logout"
methods = ["POST"]

[[router.routes]]
path = "/debug"
"#;
