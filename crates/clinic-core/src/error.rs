//! 错误定义模块

use thiserror::Error;

/// 诊所系统统一错误类型
#[derive(Error, Debug)]
pub enum ClinicError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidTransition { from: String, event: String },

    #[error("时段不可用: 牙医 {dentist_id} 在 {date} {start_time}-{end_time}")]
    SlotUnavailable {
        dentist_id: i64,
        date: chrono::NaiveDate,
        start_time: chrono::NaiveTime,
        end_time: chrono::NaiveTime,
    },

    #[error("预约创建失败: {0}")]
    AppointmentCreationFailed(String),

    #[error("外部调用结果未知: {0}")]
    UnknownOutcome(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 诊所系统统一结果类型
pub type Result<T> = std::result::Result<T, ClinicError>;
