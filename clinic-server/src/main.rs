//! 候诊队列服务主程序
//!
//! 托管队列引擎与周期性过期清扫；对外的 REST 层由上层应用提供

mod config;

use anyhow::Result;
use clap::Parser;
use clinic_integration::{AuthConfig, HttpSchedulingConnector, SchedulingConnectorConfig};
use clinic_queue::{QueueEngine, QueueEngineConfig, SystemClock};
use config::ServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 候诊队列服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "clinic-server")]
#[command(about = "牙科诊所候诊队列调度服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 后端调度系统地址（覆盖配置文件）
    #[arg(short, long)]
    endpoint: Option<String>,

    /// 清扫间隔（秒，覆盖配置文件）
    #[arg(short, long)]
    sweep_interval: Option<u64>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(args.log_level.as_str())
        .init();

    info!("启动候诊队列服务...");

    // 加载配置并应用命令行覆盖
    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    if let Some(endpoint) = args.endpoint {
        server_config.backend.endpoint = endpoint;
    }
    if let Some(interval) = args.sweep_interval {
        server_config.sweeper.interval_secs = interval;
    }

    info!("候诊队列服务配置:");
    info!("  后端地址: {}", server_config.backend.endpoint);
    info!("  调用超时: {}s", server_config.backend.call_timeout_secs);
    info!("  清扫间隔: {}s", server_config.sweeper.interval_secs);
    info!("  最大等待天数: {}", server_config.sweeper.max_waiting_age_days);

    // 构建后端连接器
    let mut connector_config = SchedulingConnectorConfig::new(
        "clinic-backend",
        &server_config.backend.endpoint,
    );
    connector_config.request_timeout_secs = server_config.backend.call_timeout_secs;
    if let Some(api_key) = server_config.backend.api_key.clone() {
        connector_config.authentication = AuthConfig::ApiKey {
            key: api_key,
            header: None,
        };
    }
    let connector = Arc::new(HttpSchedulingConnector::new(connector_config)?);

    match connector.check_connection().await {
        Ok(true) => info!("后端调度系统连接正常"),
        Ok(false) => warn!("后端调度系统健康检查未通过，服务继续启动"),
        Err(e) => warn!("后端健康检查失败: {}", e),
    }

    // 构建队列引擎
    let engine = QueueEngine::new(
        connector.clone(),
        connector,
        Arc::new(SystemClock),
        QueueEngineConfig {
            call_timeout: Duration::from_secs(server_config.backend.call_timeout_secs),
            max_waiting_age: chrono::Duration::days(server_config.sweeper.max_waiting_age_days),
        },
    );

    // 周期性过期清扫，直到收到退出信号
    let mut ticker = tokio::time::interval(Duration::from_secs(server_config.sweeper.interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // 第一次 tick 立即返回

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = engine.sweep_expired().await;
                if report.examined > 0 {
                    info!(
                        "过期清扫: 检查 {} 条, 过期 {} 条, 跳过 {} 条",
                        report.examined, report.expired, report.skipped
                    );
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("等待退出信号失败: {}", e);
                }
                info!("收到退出信号，正在关闭候诊队列服务");
                break;
            }
        }
    }

    Ok(())
}
