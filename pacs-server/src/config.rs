//! 配置管理
//!
//! 默认值 < 配置文件 < `PACS__` 前缀环境变量 < 命令行参数。

use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use pacs_dicom::DicomServerConfig;
use pacs_workflow::EngineConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// 服务完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub engine: EngineSection,
}

/// DICOM服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub ae_title: String,
    pub port: u16,
    pub max_associations: u32,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            ae_title: "PACS_SERVER".to_string(),
            port: 11112,
            max_associations: 100,
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// 存储根目录，其下为 received / queue / processed
    pub root: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: "dcmstore".to_string(),
        }
    }
}

/// 生命周期引擎配置（秒）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub scan_interval_secs: u64,
    pub quiet_period_secs: u64,
    pub queue_interval_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            scan_interval_secs: 20,
            quiet_period_secs: 120,
            queue_interval_secs: 300,
        }
    }
}

impl ServerSettings {
    /// 加载配置，`path` 为空时只使用默认值和环境变量
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("PACS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: ServerSettings = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match path {
            Some(path) => info!("Configuration loaded successfully from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            scan_interval: Duration::from_secs(self.engine.scan_interval_secs),
            quiet_period: Duration::from_secs(self.engine.quiet_period_secs),
            queue_interval: Duration::from_secs(self.engine.queue_interval_secs),
        }
    }

    pub fn dicom_config(&self) -> DicomServerConfig {
        DicomServerConfig {
            ae_title: self.server.ae_title.clone(),
            port: self.server.port,
            max_associations: self.server.max_associations,
        }
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.server.ae_title.trim().is_empty() || self.server.ae_title.len() > 16 {
            anyhow::bail!("AE title must be 1-16 characters: {:?}", self.server.ae_title);
        }
        if self.storage.root.trim().is_empty() {
            anyhow::bail!("storage root must not be empty");
        }
        self.engine_config()
            .validate()
            .context("Invalid engine configuration")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = ServerSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.storage.root, "dcmstore");

        let engine = settings.engine_config();
        assert_eq!(engine.scan_interval, Duration::from_secs(20));
        assert_eq!(engine.quiet_period, Duration::from_secs(120));
        assert_eq!(engine.queue_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pacs.toml");
        std::fs::write(
            &path,
            "[server]\nae_title = \"RECEIVER\"\n\n[engine]\nquiet_period_secs = 600\n",
        )
        .unwrap();

        let settings = ServerSettings::load(path.to_str()).unwrap();

        assert_eq!(settings.server.ae_title, "RECEIVER");
        assert_eq!(settings.server.port, 11112);
        assert_eq!(settings.engine.quiet_period_secs, 600);
        assert_eq!(settings.engine.scan_interval_secs, 20);
    }

    #[test]
    fn test_invalid_settings() {
        let mut settings = ServerSettings::default();
        settings.engine.quiet_period_secs = 5;
        assert!(settings.validate().is_err());

        let mut settings = ServerSettings::default();
        settings.server.ae_title = "A_TITLE_THAT_IS_TOO_LONG".to_string();
        assert!(settings.validate().is_err());
    }
}
