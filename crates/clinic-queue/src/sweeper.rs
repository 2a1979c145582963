//! 过期清扫器
//!
//! 按需（或由宿主进程周期性）把偏好窗口已过去的候诊条目标记为
//! 过期；转换守卫失败的条目计为跳过，不视为致命错误

use chrono::{DateTime, Duration, Utc};
use clinic_core::QueueEntry;
use serde::{Deserialize, Serialize};

use crate::state_machine::{QueueEvent, QueueStateMachine};
use crate::store::QueueStore;

/// 一次清扫的结果统计
///
/// `examined == expired + skipped`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: usize,
    pub skipped: usize,
}

/// 过期清扫器
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    /// 无偏好日期条目的最大等待时长，超过后视为过期
    max_waiting_age: Duration,
}

impl ExpirySweeper {
    pub fn new(max_waiting_age: Duration) -> Self {
        Self { max_waiting_age }
    }

    /// 执行一次清扫
    ///
    /// 候选条目：偏好日期严格早于 `cutoff` 的条目，或没有偏好日期
    /// 且创建时间早于 `now - max_waiting_age` 的条目。候选范围不按
    /// 状态预筛，终态条目由状态机守卫拒绝并计入跳过
    pub fn sweep(
        &self,
        store: &mut QueueStore,
        state_machine: &QueueStateMachine,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let age_cutoff = now - self.max_waiting_age;

        let candidate_ids: Vec<(i64, DateTime<Utc>)> = store
            .query(&crate::store::QueueFilter {
                limit: None,
                offset: None,
                ..Default::default()
            })
            .iter()
            .filter_map(|entry| self.candidate_cutoff(entry, cutoff, age_cutoff))
            .collect();

        let mut report = SweepReport {
            examined: candidate_ids.len(),
            expired: 0,
            skipped: 0,
        };

        for (id, entry_cutoff) in candidate_ids {
            let event = QueueEvent::Expire { cutoff: entry_cutoff };
            let applied = store
                .get_mut(id)
                .and_then(|entry| state_machine.apply(entry, &event, now));

            match applied {
                Ok(_) => report.expired += 1,
                Err(e) => {
                    tracing::debug!("Sweep skipped queue entry {}: {}", id, e);
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            "Expiry sweep finished: examined {}, expired {}, skipped {}",
            report.examined,
            report.expired,
            report.skipped
        );
        report
    }

    /// 判定条目是否为清扫候选，返回用于过期守卫的截止点
    fn candidate_cutoff(
        &self,
        entry: &QueueEntry,
        cutoff: DateTime<Utc>,
        age_cutoff: DateTime<Utc>,
    ) -> Option<(i64, DateTime<Utc>)> {
        match entry.effective_deadline() {
            Some(deadline) if deadline < cutoff => Some((entry.id, cutoff)),
            Some(_) => None,
            None if entry.created_at < age_cutoff => Some((entry.id, age_cutoff)),
            None => None,
        }
    }
}
