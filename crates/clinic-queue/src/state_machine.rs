//! 候诊条目状态机
//!
//! 管理候诊队列条目的完整生命周期状态转换

use chrono::{DateTime, Utc};
use clinic_core::{ClinicError, QueueEntry, QueueStatus, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 状态转换事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum QueueEvent {
    /// 通知患者有可用时段（重复通知合法，累计联系次数）
    Notify,
    /// 取消候诊
    Cancel,
    /// 转换为已确认的预约，必须携带具体的预约ID
    Convert { appointment_id: i64 },
    /// 过期：有效截止时间早于给定截止点
    Expire { cutoff: DateTime<Utc> },
}

/// 事件种类（用于转换规则表的键）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QueueEventKind {
    Notify,
    Cancel,
    Convert,
    Expire,
}

impl QueueEvent {
    pub fn kind(&self) -> QueueEventKind {
        match self {
            QueueEvent::Notify => QueueEventKind::Notify,
            QueueEvent::Cancel => QueueEventKind::Cancel,
            QueueEvent::Convert { .. } => QueueEventKind::Convert,
            QueueEvent::Expire { .. } => QueueEventKind::Expire,
        }
    }
}

/// 候诊条目状态机
///
/// 转换从不自动发生，每次都由外部调用触发；守卫校验全部通过之后
/// 才写入任何字段，失败的转换不产生部分修改
#[derive(Debug)]
pub struct QueueStateMachine {
    transitions: HashMap<(QueueStatus, QueueEventKind), QueueStatus>,
}

impl QueueStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义状态转换规则
        transitions.insert((QueueStatus::Waiting, QueueEventKind::Notify), QueueStatus::Notified);
        transitions.insert((QueueStatus::Notified, QueueEventKind::Notify), QueueStatus::Notified);
        transitions.insert((QueueStatus::Waiting, QueueEventKind::Cancel), QueueStatus::Cancelled);
        transitions.insert((QueueStatus::Notified, QueueEventKind::Cancel), QueueStatus::Cancelled);
        transitions.insert((QueueStatus::Notified, QueueEventKind::Convert), QueueStatus::Converted);
        transitions.insert((QueueStatus::Waiting, QueueEventKind::Expire), QueueStatus::Expired);
        transitions.insert((QueueStatus::Notified, QueueEventKind::Expire), QueueStatus::Expired);

        Self { transitions }
    }

    /// 检查状态转换是否合法
    pub fn can_transition(&self, from: QueueStatus, event: QueueEventKind) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 计算目标状态，不合法则返回 InvalidTransition
    pub fn target(&self, from: QueueStatus, event: QueueEventKind) -> Result<QueueStatus> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(ClinicError::InvalidTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 获取某状态下所有可能的事件种类
    pub fn possible_events(&self, current_state: QueueStatus) -> Vec<QueueEventKind> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }

    /// 对条目执行状态转换
    ///
    /// 先校验转换合法性与事件守卫，全部通过后才修改条目；
    /// 任何失败都保持条目原样
    pub fn apply(
        &self,
        entry: &mut QueueEntry,
        event: &QueueEvent,
        now: DateTime<Utc>,
    ) -> Result<QueueStatus> {
        let to = self.target(entry.status, event.kind())?;

        // 事件守卫（在任何修改之前校验）
        if let QueueEvent::Expire { cutoff } = event {
            // 有偏好日期时截止点为当天结束时刻，否则以创建时间
            // 对照调用方给出的截止点
            let deadline = entry.effective_deadline().unwrap_or(entry.created_at);
            if deadline >= *cutoff {
                return Err(ClinicError::InvalidTransition {
                    from: format!("{:?}", entry.status),
                    event: format!("Expire(deadline {} not past cutoff {})", deadline, cutoff),
                });
            }
        }

        match event {
            QueueEvent::Notify => {
                if !entry.notified {
                    entry.notified = true;
                    entry.notified_at = Some(now);
                }
                entry.contact_attempts += 1;
                entry.last_contact_attempt_at = Some(now);
            }
            QueueEvent::Cancel => {}
            QueueEvent::Convert { appointment_id } => {
                entry.appointment_id = Some(*appointment_id);
                entry.converted_at = Some(now);
            }
            QueueEvent::Expire { .. } => {}
        }

        let from = entry.status;
        entry.status = to;
        entry.updated_at = now;

        tracing::info!(
            "Queue entry {} transitioned from {:?} to {:?} on {:?}",
            entry.id,
            from,
            to,
            event.kind()
        );
        Ok(to)
    }
}

impl Default for QueueStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
