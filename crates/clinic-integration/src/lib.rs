//! # 系统集成模块
//!
//! 提供与诊所后端调度系统的连接器：可用性检查、预约创建、
//! 补偿性取消与对账查询。

pub mod connectors;

pub use connectors::{AuthConfig, HttpSchedulingConnector, SchedulingConnectorConfig};
