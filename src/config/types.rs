use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub converter: ConverterConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment label shown on the admin dashboard
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_environment() -> String {
    "production".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding the database and generated artifacts
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("readly.db")
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Maximum conversions per device in any trailing 24 hours
    #[serde(default = "default_max_per_day")]
    pub max_per_day: u32,
}

fn default_max_per_day() -> u32 {
    50
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_day: default_max_per_day(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Shared secret for the reporting surface. Also keys the session token.
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Jobs at least this many days old are deleted with their files
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    #[serde(default = "default_retention_interval")]
    pub interval_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_max_age_days() -> u32 {
    7
}
fn default_retention_interval() -> u64 {
    3600
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_days: default_max_age_days(),
            interval_secs: default_retention_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConverterConfig {
    /// Renderer executable. Conversions fail until this is set.
    #[serde(default)]
    pub program: Option<PathBuf>,

    /// Extra arguments placed before the per-job arguments
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_converter_timeout")]
    pub timeout_secs: u64,
}

fn default_converter_timeout() -> u64 {
    300
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            timeout_secs: default_converter_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Capacity of the in-process job lookup cache
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

fn default_cache_entries() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_entries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyticsConfig {
    /// Offset used for calendar days in reports (hours east of UTC)
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    #[serde(default = "default_trend_days")]
    pub trend_days: u32,

    #[serde(default = "default_top_domains")]
    pub top_domains: usize,
}

fn default_utc_offset() -> i32 {
    8
}
fn default_trend_days() -> u32 {
    30
}
fn default_top_domains() -> usize {
    10
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset(),
            trend_days: default_trend_days(),
            top_domains: default_top_domains(),
        }
    }
}
