use crate::db::ConflictPolicy;
use bigdecimal::BigDecimal;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// 配置文件名 (不带扩展名，toml/yaml/json 均可)
const CONFIG_FILE: &str = "invoice-pipeline";
/// 环境变量前缀：INVOICE__SERVER__PORT=9000
const ENV_PREFIX: &str = "INVOICE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub notification: NotificationConfig,
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
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 未配置时使用内存存储
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub apply_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_secs: 30,
            apply_schema: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 文件系统对象存储根目录；未配置时使用内存存储
    pub root: Option<String>,
    pub staging_bucket: String,
    pub output_bucket: String,
    pub processed_bucket: String,
    pub failed_bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            staging_bucket: "invoice-staging".to_string(),
            output_bucket: "invoice-extraction-output".to_string(),
            processed_bucket: "invoice-processed".to_string(),
            failed_bucket: "invoice-failed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub high_value_threshold: BigDecimal,
    pub confidence_threshold: f64,
    pub conflict_policy: ConflictPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            high_value_threshold: BigDecimal::from(crate::service::classifier::DEFAULT_HIGH_VALUE_THRESHOLD),
            confidence_threshold: crate::service::validator::DEFAULT_CONFIDENCE_THRESHOLD,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// 审批链接的基地址
    pub approval_endpoint: String,
    /// 未配置时通知只写日志
    pub webhook_url: Option<Url>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            approval_endpoint: "http://127.0.0.1:8080/api/approval".to_string(),
            webhook_url: None,
        }
    }
}

// 连接串口令和 webhook 路径 (通常含 token) 不进日志
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_deref().map(redact_password))
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("apply_schema", &self.apply_schema)
            .finish()
    }
}

impl fmt::Debug for NotificationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationConfig")
            .field("approval_endpoint", &self.approval_endpoint)
            .field("webhook_url", &self.webhook_url.as_ref().map(|u| u.origin().ascii_serialization()))
            .finish()
    }
}

fn redact_password(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("****")).is_err() {
                return "<redacted>".to_string();
            }
            url.to_string()
        }
        Err(_) => "<redacted>".to_string(),
    }
}

impl NotificationConfig {
    pub fn approval_endpoint_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.approval_endpoint).map_err(|source| ConfigError::InvalidUrl {
            field: "notification.approval_endpoint",
            source,
        })
    }
}

impl AppConfig {
    /// 默认值 → 配置文件 (可选) → INVOICE__* 环境变量 → DATABASE_URL
    pub fn from_env() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        if config.database.url.is_none() {
            config.database.url = std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty());
        }
        Ok(config)
    }

    /// 从 TOML 文本加载 (测试和嵌入场景)
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
