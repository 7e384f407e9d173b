//! # 时间戳处理
//!
//! 数据库以微秒精度存储时间戳，相同微秒的两行会破坏下游排序和插值，
//! 因此所有记录路径都先取整到微秒再去重（保留第一次出现）。

use std::collections::HashSet;
use std::hash::Hash;
use std::time::{SystemTime, UNIX_EPOCH};

/// 当前 Unix 时间（微秒）
pub fn now_us() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_micros() as u64
}

/// 秒取整到微秒（仍以秒表示）
pub fn round_to_us(secs: f64) -> f64 {
    (secs * 1e6).round() / 1e6
}

/// 秒 → 整数微秒
pub fn secs_to_us(secs: f64) -> i64 {
    (secs * 1e6).round() as i64
}

/// 按键去重，保留每个键第一次出现的元素
///
/// 返回被去掉的元素个数。保持原有顺序。
///
/// ```rust
/// use gantry_tools::dedup_keep_first;
///
/// let mut rows = vec![(1, 'a'), (2, 'b'), (1, 'c'), (3, 'd')];
/// let removed = dedup_keep_first(&mut rows, |r| r.0);
/// assert_eq!(removed, 1);
/// assert_eq!(rows, vec![(1, 'a'), (2, 'b'), (3, 'd')]);
/// ```
pub fn dedup_keep_first<T, K, F>(items: &mut Vec<T>, mut key: F) -> usize
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let before = items.len();
    let mut seen = HashSet::with_capacity(before);
    items.retain(|item| seen.insert(key(item)));
    before - items.len()
}
