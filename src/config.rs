use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::providers::cloudapi::{CloudApiClientConfig, DEFAULT_API_VERSION, DEFAULT_GRAPH_URL};
use crate::providers::uazapi::{UazapiClientConfig, DEFAULT_BASE_URL};
use crate::retry::RetryPolicy;

const CONFIG_ENV: &str = "WA_ORCHESTRATOR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "~/.wa-orchestrator/config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub uazapi: UazapiConfig,
    pub cloudapi: CloudApiConfig,
    pub events: EventsConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8092,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub sqlite_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            sqlite_path: "~/.wa-orchestrator/state.sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UazapiConfig {
    pub enabled: bool,
    pub base_url: String,
    pub admin_token: Option<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub circuit_breaker: bool,
}

impl Default for UazapiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            admin_token: None,
            timeout_ms: 30_000,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            circuit_breaker: true,
        }
    }
}

impl UazapiConfig {
    pub fn client_config(&self) -> UazapiClientConfig {
        UazapiClientConfig {
            base_url: self.base_url.clone(),
            admin_token: self.admin_token.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            retry: RetryPolicy {
                max_attempts: self.max_retries.max(1),
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
            },
            circuit_breaker: self.circuit_breaker,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudApiConfig {
    pub enabled: bool,
    pub graph_base_url: String,
    pub api_version: String,
    pub timeout_ms: u64,
    /// Signs inbound webhooks (`X-Hub-Signature-256`).
    pub app_secret: Option<String>,
    /// Shared secret for the GET subscription handshake.
    pub verify_token: Option<String>,
}

impl Default for CloudApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            graph_base_url: DEFAULT_GRAPH_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout_ms: 30_000,
            app_secret: None,
            verify_token: None,
        }
    }
}

impl CloudApiConfig {
    pub fn client_config(&self) -> CloudApiClientConfig {
        CloudApiClientConfig {
            graph_base_url: self.graph_base_url.clone(),
            api_version: self.api_version.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast buffer for normalized events; slow subscribers lag past it.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Prefix outgoing texts with the bot signature so their webhook echoes
    /// can be dropped.
    pub bot_signature: bool,
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| expand_tilde(DEFAULT_CONFIG_PATH))
}

pub fn load_config() -> Config {
    load_config_from(&resolve_config_path())
}

/// Reads `path` (missing or invalid files fall back to defaults), then
/// applies environment overrides.
pub fn load_config_from(path: &Path) -> Config {
    let mut cfg = read_config_file(path).unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg
}

fn read_config_file(path: &Path) -> Option<Config> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Config>(&raw) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "invalid config file, using defaults");
            None
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(token) = env_value("WA_ORCHESTRATOR_TOKEN") {
        cfg.auth.token = Some(token);
    }
    if let Some(url) = env_value("WA_ORCHESTRATOR_DATABASE_URL") {
        cfg.database.url = Some(url);
    }
    if let Some(path) = env_value("WA_ORCHESTRATOR_SQLITE_PATH") {
        cfg.database.sqlite_path = path;
    }
    if let Some(url) = env_value("UAZAPI_BASE_URL") {
        cfg.uazapi.base_url = url;
    }
    if let Some(token) = env_value("UAZAPI_ADMIN_TOKEN") {
        cfg.uazapi.admin_token = Some(token);
    }
    if let Some(url) = env_value("CLOUDAPI_GRAPH_URL") {
        cfg.cloudapi.graph_base_url = url;
    }
    if let Some(version) = env_value("CLOUDAPI_API_VERSION") {
        cfg.cloudapi.api_version = version;
    }
    if let Some(secret) = env_value("CLOUDAPI_APP_SECRET") {
        cfg.cloudapi.app_secret = Some(secret);
    }
    if let Some(token) = env_value("CLOUDAPI_WEBHOOK_VERIFY_TOKEN") {
        cfg.cloudapi.verify_token = Some(token);
    }
    if let Some(flag) = env_value("WA_ORCHESTRATOR_BOT_SIGNATURE") {
        cfg.orchestrator.bot_signature = matches!(flag.trim(), "1" | "true" | "yes");
    }
}

pub fn ensure_config_dir() {
    let path = resolve_config_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
}

pub fn resolve_database_url(cfg: &Config) -> String {
    if let Some(url) = cfg.database.url.as_ref() {
        return url.to_string();
    }

    let path = expand_tilde(&cfg.database.sqlite_path);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    format!("sqlite://{}", path.to_string_lossy())
}
