//! 服务配置
//!
//! 可选的TOML配置文件加上 `IMAGING_` 前缀的环境变量覆盖，
//! 层级之间用双下划线分隔，例如 `IMAGING_INDEXING__BUCKET_SIZE=50`。

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use imaging_indexing::IndexingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// 服务配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub database: DatabaseSettings,
    pub search: SearchSettings,
    pub indexing: LoopSettings,
    pub removal: LoopSettings,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://imaging.db".to_string(),
            max_connections: 5,
        }
    }
}

/// 搜索后端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    pub endpoint: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            index: "images".to_string(),
            username: None,
            password: None,
            timeout_seconds: 30,
        }
    }
}

/// 后台循环配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopSettings {
    pub bucket_size: usize,
    pub interval_seconds: u64,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            bucket_size: 100,
            interval_seconds: 10,
        }
    }
}

impl LoopSettings {
    pub fn to_indexing_config(&self) -> IndexingConfig {
        IndexingConfig {
            bucket_size: self.bucket_size,
            interval: Duration::from_secs(self.interval_seconds),
        }
    }
}

impl ServerConfig {
    /// 加载配置文件和环境变量
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let builder = builder.add_source(
            Environment::with_prefix("IMAGING")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = Self::from_builder(builder)?;

        match path {
            Some(path) => info!("Configuration loaded from {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            anyhow::bail!("database.url must not be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be greater than 0");
        }
        if self.search.timeout_seconds == 0 {
            anyhow::bail!("search.timeout_seconds must be greater than 0");
        }

        self.indexing
            .to_indexing_config()
            .validate()
            .context("Invalid [indexing] settings")?;
        self.removal
            .to_indexing_config()
            .validate()
            .context("Invalid [removal] settings")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> Result<ServerConfig> {
        ServerConfig::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = parse("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.indexing.to_indexing_config().interval, Duration::from_secs(10));
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let config = parse(
            r#"
            [database]
            url = "sqlite::memory:"

            [indexing]
            bucket_size = 25

            [removal]
            interval_seconds = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.indexing.bucket_size, 25);
        assert_eq!(config.indexing.interval_seconds, 10);
        assert_eq!(config.removal.interval_seconds, 60);
        assert_eq!(config.search.index, "images");
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = ServerConfig::default();
        config.indexing.bucket_size = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.removal.interval_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
