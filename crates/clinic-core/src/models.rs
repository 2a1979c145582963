//! 核心数据模型定义

use crate::error::{ClinicError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// 候诊队列条目状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    Waiting,   // 等待中
    Notified,  // 已通知
    Converted, // 已转为预约
    Cancelled, // 已取消
    Expired,   // 已过期
}

impl QueueStatus {
    /// 终态不允许任何后续转换
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueStatus::Converted | QueueStatus::Cancelled | QueueStatus::Expired
        )
    }
}

/// 偏好时段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PeriodOfDay {
    Morning,   // 上午
    Afternoon, // 下午
    Evening,   // 晚上
    Any,       // 不限
}

/// 牙科诊疗项目类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProcedureType {
    Consultation, // 问诊
    Cleaning,     // 洁牙
    Extraction,   // 拔牙
    Filling,      // 补牙
    RootCanal,    // 根管治疗
    Prosthesis,   // 义齿修复
    Orthodontics, // 正畸
    Implant,      // 种植
    Whitening,    // 美白
    Emergency,    // 急诊
    Evaluation,   // 评估
    FollowUp,     // 复诊
    Other,        // 其他
}

/// 优先级分段（仅用于展示，不作为领域约束）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PriorityBand {
    High,   // >= 8
    Medium, // 5 - 7
    Low,    // < 5
}

impl PriorityBand {
    pub fn from_priority(priority: i32) -> Self {
        if priority >= 8 {
            PriorityBand::High
        } else if priority >= 5 {
            PriorityBand::Medium
        } else {
            PriorityBand::Low
        }
    }
}

/// 候诊队列条目
///
/// 表示一位患者在等待预约时段的请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub dentist_id: Option<i64>,    // 指定牙医（可选）
    pub dentist_name: Option<String>,
    pub accepts_any_dentist: bool,  // 是否接受任意牙医
    pub preferred_date: Option<NaiveDate>,
    pub preferred_start_time: Option<NaiveTime>,
    pub preferred_end_time: Option<NaiveTime>,
    pub preferred_period: PeriodOfDay,
    pub accepts_any_schedule: bool, // 是否接受任意时段
    pub procedure_type: Option<ProcedureType>,
    pub priority: i32,              // 数值越大越紧急
    pub status: QueueStatus,
    pub notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
    pub contact_attempts: i32,
    pub last_contact_attempt_at: Option<DateTime<Utc>>,
    pub appointment_id: Option<i64>, // 仅在转换成功后设置
    pub converted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl QueueEntry {
    /// 创建新的候诊条目（初始状态为 Waiting）
    pub fn new(
        id: i64,
        patient_id: i64,
        patient_name: String,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            patient_id,
            patient_name,
            dentist_id: None,
            dentist_name: None,
            accepts_any_dentist: true,
            preferred_date: None,
            preferred_start_time: None,
            preferred_end_time: None,
            preferred_period: PeriodOfDay::Any,
            accepts_any_schedule: true,
            procedure_type: None,
            priority,
            status: QueueStatus::Waiting,
            notified: false,
            notified_at: None,
            contact_attempts: 0,
            last_contact_attempt_at: None,
            appointment_id: None,
            converted_at: None,
            created_at: now,
            updated_at: now,
            created_by: None,
        }
    }

    /// 条目是否活跃（等待中或已通知）
    pub fn is_active(&self) -> bool {
        matches!(self.status, QueueStatus::Waiting | QueueStatus::Notified)
    }

    /// 条目是否已过期
    pub fn is_expired(&self) -> bool {
        self.status == QueueStatus::Expired
    }

    /// 优先级分段
    pub fn priority_band(&self) -> PriorityBand {
        PriorityBand::from_priority(self.priority)
    }

    /// 有效截止时间：偏好日期的当天结束时刻（UTC）
    ///
    /// 无偏好日期的条目没有固有截止时间，过期判定由调用方提供的
    /// 截止参数决定
    pub fn effective_deadline(&self) -> Option<DateTime<Utc>> {
        self.preferred_date.map(crate::utils::end_of_day_utc)
    }

    /// 校验条目字段的一致性
    pub fn validate(&self) -> Result<()> {
        if self.patient_name.trim().is_empty() {
            return Err(ClinicError::Validation(
                "patient name must not be empty".to_string(),
            ));
        }

        // 不接受任意牙医时必须指定目标牙医
        if !self.accepts_any_dentist && self.dentist_id.is_none() {
            return Err(ClinicError::Validation(
                "entry that does not accept any dentist must name a target dentist".to_string(),
            ));
        }

        if let (Some(start), Some(end)) = (self.preferred_start_time, self.preferred_end_time) {
            if start >= end {
                return Err(ClinicError::Validation(format!(
                    "preferred time window is not ordered: {} >= {}",
                    start, end
                )));
            }
        }

        // 已转换的条目必须携带预约ID，反之亦然
        match (self.status, self.appointment_id) {
            (QueueStatus::Converted, None) => Err(ClinicError::Validation(
                "converted entry is missing its appointment id".to_string(),
            )),
            (status, Some(_)) if status != QueueStatus::Converted => {
                Err(ClinicError::Validation(format!(
                    "entry with appointment id has status {:?}",
                    status
                )))
            }
            _ => Ok(()),
        }
    }
}

/// 预约状态（与后端契约一致的完整词汇表）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    Scheduled,   // 已排期
    Confirmed,   // 已确认
    Completed,   // 已完成
    NoShow,      // 爽约
    Rescheduled, // 已改期
    Cancelled,   // 已取消
}

/// 预约信息（外部协作系统拥有的实体，此处仅引用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub dentist_id: i64,
    pub patient_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub procedure_type: Option<ProcedureType>,
    pub created_at: DateTime<Utc>,
}

/// 预约创建请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub dentist_id: i64,
    pub patient_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub procedure_type: Option<ProcedureType>,
}
