//! 通用工具函数

use chrono::NaiveDate;

/// 计算两个日期之间相差的天数
///
/// 任一日期缺失时返回 `None`，结果可以为负（早于诊断日期的事件）
pub fn days_between(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Option<i32> {
    let (from, to) = (from?, to?);
    i32::try_from((to - from).num_days()).ok()
}

/// 解析任务目标键中的实体ID
pub fn parse_entity_id(key: &str) -> Option<i64> {
    key.trim().parse::<i64>().ok().filter(|id| *id > 0)
}
