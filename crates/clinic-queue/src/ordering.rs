//! 服务顺序策略
//!
//! 活跃候诊条目的纯排序函数：优先级降序，同优先级按创建时间升序
//! （严格先到先服务）；两键都相等时依靠稳定排序保持输入顺序，
//! 保证结果确定。该顺序仅供展示与选择参考，不限制哪个条目可以
//! 被转换

use clinic_core::QueueEntry;
use std::cmp::Ordering;

/// 就地按服务顺序排序（稳定）
pub fn sort_for_service(entries: &mut [&QueueEntry]) {
    entries.sort_by(|a, b| compare(a, b));
}

/// 计算活跃条目的服务顺序
///
/// 输入按原始插入顺序给出；非活跃条目被剔除
pub fn service_order(entries: Vec<QueueEntry>) -> Vec<QueueEntry> {
    let mut active: Vec<QueueEntry> = entries.into_iter().filter(|e| e.is_active()).collect();
    active.sort_by(compare);
    active
}

/// 条目在服务顺序中的位置（从0开始）
pub fn position_of(ordered: &[QueueEntry], entry_id: i64) -> Option<usize> {
    ordered.iter().position(|e| e.id == entry_id)
}

fn compare(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    match b.priority.cmp(&a.priority) {
        Ordering::Equal => a.created_at.cmp(&b.created_at),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use clinic_core::QueueStatus;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    fn entry(id: i64, priority: i32, created_at: DateTime<Utc>) -> QueueEntry {
        let mut e = QueueEntry::new(id, id + 100, format!("patient-{}", id), priority, created_at);
        e.updated_at = created_at;
        e
    }

    #[test]
    fn test_priority_descending() {
        let order = service_order(vec![
            entry(1, 2, t0()),
            entry(2, 9, t0()),
            entry(3, 5, t0()),
        ]);
        let ids: Vec<i64> = order.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_fifo_within_equal_priority() {
        let order = service_order(vec![
            entry(1, 9, t0() + chrono::Duration::seconds(1)),
            entry(2, 9, t0()),
        ]);
        let ids: Vec<i64> = order.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_stable_on_full_tie() {
        // 优先级与创建时间都相同：保持插入顺序
        let order = service_order(vec![
            entry(7, 5, t0()),
            entry(3, 5, t0()),
            entry(9, 5, t0()),
        ]);
        let ids: Vec<i64> = order.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![7, 3, 9]);
    }

    #[test]
    fn test_deterministic_for_identical_input() {
        let input = vec![
            entry(1, 5, t0()),
            entry(2, 8, t0()),
            entry(3, 5, t0() - chrono::Duration::hours(1)),
        ];
        let first = service_order(input.clone());
        let second = service_order(input);
        let a: Vec<i64> = first.iter().map(|e| e.id).collect();
        let b: Vec<i64> = second.iter().map(|e| e.id).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_active_entries_excluded() {
        let mut cancelled = entry(1, 9, t0());
        cancelled.status = QueueStatus::Cancelled;
        let order = service_order(vec![cancelled, entry(2, 1, t0())]);
        let ids: Vec<i64> = order.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_position_of() {
        let order = service_order(vec![entry(1, 2, t0()), entry(2, 9, t0())]);
        assert_eq!(position_of(&order, 2), Some(0));
        assert_eq!(position_of(&order, 1), Some(1));
        assert_eq!(position_of(&order, 42), None);
    }
}
