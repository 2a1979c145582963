//! 通用工具函数

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

/// 生成外部调用关联标识符
pub fn generate_correlation_id() -> String {
    format!("clinic-{}", Uuid::new_v4().simple())
}

/// 某个日期的当天结束时刻（UTC）
pub fn end_of_day_utc(date: NaiveDate) -> DateTime<Utc> {
    let end = NaiveTime::from_hms_opt(23, 59, 59).unwrap();
    date.and_time(end).and_utc()
}
