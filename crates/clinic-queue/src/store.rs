//! 候诊队列存储
//!
//! 候诊条目的唯一持有者，提供查找、过滤和列表操作；
//! 存储本身不产生任何副作用

use chrono::{DateTime, Utc};
use clinic_core::{ClinicError, PriorityBand, ProcedureType, QueueEntry, QueueStatus, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ordering;

/// 队列查询过滤器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueFilter {
    pub dentist_id: Option<i64>,
    pub patient_id: Option<i64>,
    pub status: Option<Vec<QueueStatus>>,
    pub procedure_type: Option<ProcedureType>,
    pub min_priority: Option<i32>,
    pub only_active: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Default for QueueFilter {
    fn default() -> Self {
        Self {
            dentist_id: None,
            patient_id: None,
            status: None,
            procedure_type: None,
            min_priority: None,
            only_active: false,
            limit: Some(50),
            offset: Some(0),
        }
    }
}

/// 队列统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_entries: usize,
    pub waiting: usize,
    pub notified: usize,
    pub converted: usize,
    pub cancelled: usize,
    pub expired: usize,
    pub by_priority_band: HashMap<PriorityBand, usize>,
    pub oldest_waiting_created_at: Option<DateTime<Utc>>,
}

/// 候诊队列存储
///
/// 进程内单一写入者；每个条目记录插入序号，用于相同优先级、
/// 相同创建时间条目的确定性排序
#[derive(Debug)]
pub struct QueueStore {
    entries: HashMap<i64, QueueEntry>,
    insertion_seq: HashMap<i64, u64>, // entry_id -> 插入序号
    next_id: i64,
    next_seq: u64,
}

impl QueueStore {
    /// 创建新的队列存储
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            insertion_seq: HashMap::new(),
            next_id: 1,
            next_seq: 0,
        }
    }

    /// 插入新条目，由存储分配条目ID
    pub fn insert(&mut self, mut entry: QueueEntry) -> Result<QueueEntry> {
        entry.id = self.next_id;
        entry.validate()?;

        self.next_id += 1;
        self.insertion_seq.insert(entry.id, self.next_seq);
        self.next_seq += 1;
        self.entries.insert(entry.id, entry.clone());

        tracing::info!(
            "Inserted queue entry {} for patient {} (priority {})",
            entry.id,
            entry.patient_id,
            entry.priority
        );
        Ok(entry)
    }

    /// 写入或更新条目
    ///
    /// 已存在的条目保留原始创建时间与插入序号（创建时间不可变）
    pub fn upsert(&mut self, mut entry: QueueEntry) -> Result<QueueEntry> {
        let is_new = match self.entries.get(&entry.id) {
            Some(existing) => {
                entry.created_at = existing.created_at;
                false
            }
            None => true,
        };

        // 先校验再登记：无效条目不得占用ID或留下孤立的插入序号
        entry.validate()?;

        if is_new {
            self.next_id = self.next_id.max(entry.id + 1);
            self.insertion_seq.insert(entry.id, self.next_seq);
            self.next_seq += 1;
        }
        self.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    /// 获取条目
    pub fn get(&self, id: i64) -> Result<&QueueEntry> {
        self.entries
            .get(&id)
            .ok_or_else(|| ClinicError::NotFound(format!("queue entry {} not found", id)))
    }

    /// 获取可变条目（仅限本 crate 的转换流程使用）
    pub(crate) fn get_mut(&mut self, id: i64) -> Result<&mut QueueEntry> {
        self.entries
            .get_mut(&id)
            .ok_or_else(|| ClinicError::NotFound(format!("queue entry {} not found", id)))
    }

    /// 硬删除条目（任何状态均允许，不属于状态转换）
    pub fn delete(&mut self, id: i64) -> Result<QueueEntry> {
        let entry = self
            .entries
            .remove(&id)
            .ok_or_else(|| ClinicError::NotFound(format!("queue entry {} not found", id)))?;
        self.insertion_seq.remove(&id);

        tracing::info!("Deleted queue entry {} (status {:?})", id, entry.status);
        Ok(entry)
    }

    /// 按牙医列出条目：目标牙医匹配，或条目接受任意牙医
    pub fn list_by_dentist(&self, dentist_id: i64) -> Vec<&QueueEntry> {
        self.sorted_by_insertion(
            self.entries
                .values()
                .filter(|e| e.dentist_id == Some(dentist_id) || e.accepts_any_dentist),
        )
    }

    /// 按患者列出条目
    pub fn list_by_patient(&self, patient_id: i64) -> Vec<&QueueEntry> {
        self.sorted_by_insertion(self.entries.values().filter(|e| e.patient_id == patient_id))
    }

    /// 按状态列出条目
    pub fn list_by_status(&self, status: QueueStatus) -> Vec<&QueueEntry> {
        self.sorted_by_insertion(self.entries.values().filter(|e| e.status == status))
    }

    /// 列出所有活跃条目（按插入顺序）
    pub fn list_active(&self) -> Vec<&QueueEntry> {
        self.sorted_by_insertion(self.entries.values().filter(|e| e.is_active()))
    }

    /// 查询队列
    ///
    /// 结果按服务顺序（优先级降序、创建时间升序）排列后分页
    pub fn query(&self, filter: &QueueFilter) -> Vec<QueueEntry> {
        let mut items: Vec<&QueueEntry> = self.sorted_by_insertion(self.entries.values());

        // 应用过滤器
        if let Some(dentist_id) = filter.dentist_id {
            items.retain(|e| e.dentist_id == Some(dentist_id) || e.accepts_any_dentist);
        }

        if let Some(patient_id) = filter.patient_id {
            items.retain(|e| e.patient_id == patient_id);
        }

        if let Some(statuses) = &filter.status {
            items.retain(|e| statuses.contains(&e.status));
        }

        if let Some(procedure) = filter.procedure_type {
            items.retain(|e| e.procedure_type == Some(procedure));
        }

        if let Some(min_priority) = filter.min_priority {
            items.retain(|e| e.priority >= min_priority);
        }

        if filter.only_active {
            items.retain(|e| e.is_active());
        }

        ordering::sort_for_service(&mut items);

        // 应用分页
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(50);

        let total = items.len();
        let start = offset.min(total);
        let end = (start + limit).min(total);

        items[start..end].iter().map(|e| (*e).clone()).collect()
    }

    /// 获取队列统计
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total_entries: self.entries.len(),
            waiting: 0,
            notified: 0,
            converted: 0,
            cancelled: 0,
            expired: 0,
            by_priority_band: HashMap::new(),
            oldest_waiting_created_at: None,
        };

        for entry in self.entries.values() {
            match entry.status {
                QueueStatus::Waiting => stats.waiting += 1,
                QueueStatus::Notified => stats.notified += 1,
                QueueStatus::Converted => stats.converted += 1,
                QueueStatus::Cancelled => stats.cancelled += 1,
                QueueStatus::Expired => stats.expired += 1,
            }

            if entry.is_active() {
                *stats
                    .by_priority_band
                    .entry(entry.priority_band())
                    .or_insert(0) += 1;
            }

            if entry.status == QueueStatus::Waiting {
                stats.oldest_waiting_created_at = match stats.oldest_waiting_created_at {
                    Some(oldest) if oldest <= entry.created_at => Some(oldest),
                    _ => Some(entry.created_at),
                };
            }
        }

        stats
    }

    /// 条目总数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按插入序号稳定排序（HashMap 迭代顺序不确定）
    fn sorted_by_insertion<'a>(
        &self,
        iter: impl Iterator<Item = &'a QueueEntry>,
    ) -> Vec<&'a QueueEntry> {
        let mut items: Vec<&QueueEntry> = iter.collect();
        items.sort_by_key(|e| self.insertion_seq.get(&e.id).copied().unwrap_or(u64::MAX));
        items
    }
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new()
    }
}
