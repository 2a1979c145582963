//! 服务配置
//!
//! 支持配置文件与 CLINIC_ 前缀环境变量覆盖

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// 候诊队列服务完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 后端调度系统配置
    pub backend: BackendConfig,
    /// 过期清扫配置
    pub sweeper: SweeperConfig,
}

/// 后端调度系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// REST API 地址
    pub endpoint: String,
    /// API 密钥（可选）
    pub api_key: Option<String>,
    /// 外部调用超时（秒）
    pub call_timeout_secs: u64,
}

/// 过期清扫配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// 清扫间隔（秒）
    pub interval_secs: u64,
    /// 无偏好日期条目的最大等待天数
    pub max_waiting_age_days: i64,
}

impl ServerConfig {
    /// 加载配置：默认值 < 配置文件 < 环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("backend.endpoint", "http://localhost:3000/api")?
            .set_default("backend.call_timeout_secs", 10i64)?
            .set_default("sweeper.interval_secs", 3600i64)?
            .set_default("sweeper.max_waiting_age_days", 30i64)?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        builder = builder.add_source(Environment::with_prefix("CLINIC").separator("__"));

        let config = builder
            .build()
            .context("failed to assemble configuration")?;

        config
            .try_deserialize()
            .context("configuration has invalid shape")
    }
}
