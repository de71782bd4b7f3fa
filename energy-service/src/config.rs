use std::{collections::HashMap, fs};

use energy_client::domain::OwnerId;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub kind: StoreKind,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    /// Currency per unit of consumption.
    #[serde(default = "default_rate_per_kwh")]
    pub rate_per_kwh: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            rate_per_kwh: default_rate_per_kwh(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Bearer token -> owner.
    #[serde(default)]
    pub tokens: HashMap<String, OwnerId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_max_connections() -> u32 {
    5
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_rate_per_kwh() -> f64 {
    0.12
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("ENERGY_CONFIG").unwrap_or_else(|_| "energy-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        if cfg.store.kind == StoreKind::Postgres && cfg.store.uri.is_none() {
            anyhow::bail!("store.uri is required when store.kind = \"postgres\"");
        }
        Ok(cfg)
    }
}
