//! 持续记录指标
//!
//! 原子计数器，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 记录器实时指标
#[derive(Debug, Default)]
pub struct LoggerMetrics {
    /// 成功入队的样本数
    pub samples_queued: AtomicU64,
    /// 因队列满被丢弃的样本数
    pub samples_dropped: AtomicU64,
    /// 因时间戳重复被去掉的样本数
    pub duplicates_suppressed: AtomicU64,
    /// 成功写入的批次数
    pub batches_written: AtomicU64,
    /// 成功写入的行数
    pub rows_written: AtomicU64,
    /// 写入失败次数（该批次丢失）
    pub write_failures: AtomicU64,
    /// 采样时读取整机状态失败的次数
    pub snapshot_failures: AtomicU64,
}

impl LoggerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> LoggerMetricsSnapshot {
        LoggerMetricsSnapshot {
            samples_queued: self.samples_queued.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            snapshot_failures: self.snapshot_failures.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.samples_queued.store(0, Ordering::Relaxed);
        self.samples_dropped.store(0, Ordering::Relaxed);
        self.duplicates_suppressed.store(0, Ordering::Relaxed);
        self.batches_written.store(0, Ordering::Relaxed);
        self.rows_written.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
        self.snapshot_failures.store(0, Ordering::Relaxed);
    }
}

/// 指标快照（不可变）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerMetricsSnapshot {
    pub samples_queued: u64,
    pub samples_dropped: u64,
    pub duplicates_suppressed: u64,
    pub batches_written: u64,
    pub rows_written: u64,
    pub write_failures: u64,
    pub snapshot_failures: u64,
}

impl LoggerMetricsSnapshot {
    /// 丢弃率（百分比），没有样本时为 0
    pub fn drop_rate(&self) -> f64 {
        let total = self.samples_queued + self.samples_dropped;
        if total == 0 {
            return 0.0;
        }
        (self.samples_dropped as f64 / total as f64) * 100.0
    }
}
