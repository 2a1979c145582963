//! # 候诊队列模块
//!
//! 提供牙科诊所候诊队列（fila de espera）的完整调度功能，包括：
//! - 队列存储：候诊条目的唯一持有者，查找与过滤
//! - 状态机：管理条目从等待到通知、转换、取消或过期的生命周期
//! - 服务顺序策略：优先级降序、先到先服务的确定性排序
//! - 转换编排器：把已通知条目变为已确认预约的多步操作
//! - 过期清扫器：按需标记偏好窗口已过去的条目

pub mod conversion;
pub mod engine;
pub mod ordering;
pub mod state_machine;
pub mod store;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出主要类型
pub use conversion::{
    AppointmentService, AvailabilityCheck, Clock, ConversionOrchestrator, ConversionOutcome,
    ConversionRequest, SystemClock,
};
pub use engine::{EnqueueRequest, QueueEngine, QueueEngineConfig};
pub use state_machine::{QueueEvent, QueueEventKind, QueueStateMachine};
pub use store::{QueueFilter, QueueStats, QueueStore};
pub use sweeper::{ExpirySweeper, SweepReport};
