use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeConfig {
    /// Vendor balance page; the device id is appended as the `mid` query
    /// parameter.
    pub base_url: String,
    pub interval_secs: u64,
    #[serde(default = "default_scrape_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
    /// Per-device push channel key; devices without one are skipped by the
    /// daily report.
    #[serde(default)]
    pub push_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_hour")]
    pub hour: u8,
    #[serde(default)]
    pub minute: u8,
    #[serde(default = "default_push_api_base")]
    pub push_api_base: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            hour: default_report_hour(),
            minute: 0,
            push_api_base: default_push_api_base(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
}

/// Whole-process configuration, loaded once at startup and passed by
/// reference into everything that needs it. Nothing reads configuration
/// ambiently after load.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scrape: ScrapeConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("MONITOR_CONFIG").unwrap_or_else(|_| "monitor-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&contents)?;
        Ok(cfg)
    }

    /// Default device for requests that do not name one.
    pub fn first_device(&self) -> Option<&DeviceConfig> {
        self.devices.first()
    }
}

fn default_scrape_timeout_secs() -> u64 {
    10
}

fn default_batch_size() -> usize {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_report_hour() -> u8 {
    9
}

fn default_push_api_base() -> String {
    "https://sctapi.ftqq.com".to_string()
}
