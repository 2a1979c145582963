//! 顶层便捷包：重新导出核心数据模型与候诊队列引擎

pub use clinic_core::{
    Appointment, AppointmentStatus, ClinicError, NewAppointment, PeriodOfDay, PriorityBand,
    ProcedureType, QueueEntry, QueueStatus, Result,
};
pub use clinic_queue::{
    ConversionOutcome, ConversionRequest, EnqueueRequest, QueueEngine, QueueEngineConfig,
    QueueFilter, QueueStats, SweepReport, SystemClock,
};
