//! 持久化接口
//!
//! 关系型数据库的事务和查询细节属于外部协作方，本层只依赖 [`StateSink`]。
//! 持续记录与离散轨迹记录共用同一张表，持续记录的行使用保留的
//! [`CONTINUOUS_RUN_ID`] 作为 run id。
//!
//! # 实现
//!
//! - [`MemorySink`]: 内存中的共享行集合，支持故障注入（测试替身）
//! - [`NullSink`]: 不存储任何内容，每次调用都告警（未配置数据库时使用）
//! - [`JsonLinesSink`]: 每行一个 JSON 对象的文件

use crate::error::StorageError;
use gantry_driver::LogSample;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// 持续记录使用的保留 run id
pub const CONTINUOUS_RUN_ID: i64 = 0;

/// 持久化后端
pub trait StateSink: Send {
    /// 批量写入样本
    fn store_state(
        &mut self,
        machine_id: i64,
        run_id: i64,
        samples: &[LogSample],
    ) -> Result<(), StorageError>;

    /// 删除该机器在 `since_us` 及之后写入的持续记录行
    fn cleanup_continuous_logging(
        &mut self,
        since_us: u64,
        machine_id: i64,
    ) -> Result<(), StorageError>;
}

impl<T: StateSink + ?Sized> StateSink for Box<T> {
    fn store_state(
        &mut self,
        machine_id: i64,
        run_id: i64,
        samples: &[LogSample],
    ) -> Result<(), StorageError> {
        (**self).store_state(machine_id, run_id, samples)
    }

    fn cleanup_continuous_logging(
        &mut self,
        since_us: u64,
        machine_id: i64,
    ) -> Result<(), StorageError> {
        (**self).cleanup_continuous_logging(since_us, machine_id)
    }
}

/// 持久化的一行
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub machine_id: i64,
    pub run_id: i64,
    #[serde(flatten)]
    pub sample: LogSample,
}

impl StoredRow {
    /// 是否属于某机器在 `since_us` 之后的持续记录
    pub fn is_continuous_since(&self, since_us: u64, machine_id: i64) -> bool {
        self.run_id == CONTINUOUS_RUN_ID
            && self.machine_id == machine_id
            && self.sample.timestamp_us >= since_us
    }
}

// ==================== MemorySink ====================

/// 内存后端（可克隆的共享句柄）
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Arc<Mutex<Vec<StoredRow>>>,
    failing: Arc<AtomicBool>,
    store_calls: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 故障注入：开启后所有调用返回 `StorageError::Unavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// 当前所有行的副本
    pub fn rows(&self) -> Vec<StoredRow> {
        self.rows.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// `store_state` 成功调用的次数
    pub fn store_calls(&self) -> u64 {
        self.store_calls.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::Relaxed) {
            Err(StorageError::Unavailable("memory sink failure injected".into()))
        } else {
            Ok(())
        }
    }
}

impl StateSink for MemorySink {
    fn store_state(
        &mut self,
        machine_id: i64,
        run_id: i64,
        samples: &[LogSample],
    ) -> Result<(), StorageError> {
        self.check()?;
        let mut rows = self.rows.lock();
        rows.extend(samples.iter().map(|sample| StoredRow {
            machine_id,
            run_id,
            sample: *sample,
        }));
        self.store_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn cleanup_continuous_logging(
        &mut self,
        since_us: u64,
        machine_id: i64,
    ) -> Result<(), StorageError> {
        self.check()?;
        self.rows
            .lock()
            .retain(|row| !row.is_continuous_since(since_us, machine_id));
        Ok(())
    }
}

// ==================== NullSink ====================

/// 空后端：丢弃一切并告警
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StateSink for NullSink {
    fn store_state(
        &mut self,
        machine_id: i64,
        run_id: i64,
        samples: &[LogSample],
    ) -> Result<(), StorageError> {
        warn!(
            "No storage backend configured, discarding {} samples (machine {}, run {})",
            samples.len(),
            machine_id,
            run_id
        );
        Ok(())
    }

    fn cleanup_continuous_logging(
        &mut self,
        since_us: u64,
        machine_id: i64,
    ) -> Result<(), StorageError> {
        warn!(
            "No storage backend configured, nothing to clean up (machine {}, since {} us)",
            machine_id, since_us
        );
        Ok(())
    }
}

// ==================== JsonLinesSink ====================

/// JSON Lines 文件后端
///
/// 写入以追加方式进行；清理时把保留的行写到临时文件再原子替换。
/// 无法解析的行在清理时原样保留。
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    /// 打开（不存在则创建）文件
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        OpenOptions::new().create(true).append(true).open(&path)?;
        info!("State log file: {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取文件中的全部行（跳过无法解析的行）
    pub fn read_rows(&self) -> Result<Vec<StoredRow>, StorageError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(row) => rows.push(row),
                Err(e) => debug!("Skipping malformed state log line: {}", e),
            }
        }
        Ok(rows)
    }
}

impl StateSink for JsonLinesSink {
    fn store_state(
        &mut self,
        machine_id: i64,
        run_id: i64,
        samples: &[LogSample],
    ) -> Result<(), StorageError> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for sample in samples {
            let row = StoredRow {
                machine_id,
                run_id,
                sample: *sample,
            };
            serde_json::to_writer(&mut writer, &row)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    fn cleanup_continuous_logging(
        &mut self,
        since_us: u64,
        machine_id: i64,
    ) -> Result<(), StorageError> {
        let tmp_path = self.path.with_extension("cleanup.tmp");
        let removed = match self.rewrite_without(&tmp_path, since_us, machine_id) {
            Ok(removed) => removed,
            Err(e) => {
                // 原文件未被替换，丢弃半成品
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            },
        };
        info!(
            "Removed {} continuous logging rows for machine {} since {} us",
            removed, machine_id, since_us
        );
        Ok(())
    }
}

impl JsonLinesSink {
    /// 把需要保留的行写到 `tmp_path` 并替换原文件，返回删除的行数
    fn rewrite_without(
        &self,
        tmp_path: &Path,
        since_us: u64,
        machine_id: i64,
    ) -> Result<usize, StorageError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut writer = BufWriter::new(File::create(tmp_path)?);
        let mut removed = 0usize;

        for line in reader.lines() {
            let line = line?;
            let matches = serde_json::from_str::<StoredRow>(&line)
                .map(|row| row.is_continuous_since(since_us, machine_id))
                .unwrap_or(false);
            if matches {
                removed += 1;
            } else {
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
        }
        writer.flush()?;
        drop(writer);

        fs::rename(tmp_path, &self.path)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64) -> LogSample {
        LogSample {
            timestamp_us: ts,
            cart_pos_m: ts as f64 / 1e6,
            ..Default::default()
        }
    }

    #[test]
    fn test_memory_sink_cleanup_scope() {
        let mut sink = MemorySink::new();
        sink.store_state(1, CONTINUOUS_RUN_ID, &[sample(100), sample(200)]).unwrap();
        sink.store_state(1, 42, &[sample(300)]).unwrap();
        sink.store_state(2, CONTINUOUS_RUN_ID, &[sample(300)]).unwrap();
        assert_eq!(sink.store_calls(), 3);

        sink.cleanup_continuous_logging(150, 1).unwrap();

        let remaining: Vec<(i64, i64, u64)> = sink
            .rows()
            .iter()
            .map(|r| (r.machine_id, r.run_id, r.sample.timestamp_us))
            .collect();
        // 早于 since 的行、离散 run 的行、其他机器的行都保留
        assert_eq!(
            remaining,
            vec![(1, CONTINUOUS_RUN_ID, 100), (1, 42, 300), (2, CONTINUOUS_RUN_ID, 300)]
        );
    }

    #[test]
    fn test_memory_sink_failure_injection() {
        let mut sink = MemorySink::new();
        sink.set_failing(true);
        let err = sink.store_state(1, 0, &[sample(1)]).unwrap_err();
        assert!(err.is_transient());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_null_sink_accepts_everything() {
        let mut sink = NullSink;
        assert!(sink.store_state(1, 0, &[sample(1)]).is_ok());
        assert!(sink.cleanup_continuous_logging(0, 1).is_ok());
    }

    #[test]
    fn test_json_lines_store_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.jsonl");
        let mut sink = JsonLinesSink::open(&path).unwrap();

        sink.store_state(1, CONTINUOUS_RUN_ID, &[sample(10), sample(20), sample(30)]).unwrap();
        sink.store_state(1, 7, &[sample(40)]).unwrap();
        assert_eq!(sink.read_rows().unwrap().len(), 4);

        sink.cleanup_continuous_logging(20, 1).unwrap();
        let rows = sink.read_rows().unwrap();
        let stamps: Vec<u64> = rows.iter().map(|r| r.sample.timestamp_us).collect();
        assert_eq!(stamps, vec![10, 40]);
        assert!((rows[0].sample.cart_pos_m - 10.0 / 1e6).abs() < 1e-15);
        assert!(!path.with_extension("cleanup.tmp").exists());
    }

    #[test]
    fn test_json_lines_cleanup_error_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.jsonl");
        let mut sink = JsonLinesSink::open(&path).unwrap();
        sink.store_state(1, CONTINUOUS_RUN_ID, &[sample(10)]).unwrap();
        // 非 UTF-8 的行使读取失败
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\xff\xfe\n").unwrap();
        drop(file);
        let before = fs::read(&path).unwrap();

        let err = sink.cleanup_continuous_logging(0, 1).unwrap_err();
        assert!(matches!(err, StorageError::Io(_)), "{:?}", err);
        assert!(!path.with_extension("cleanup.tmp").exists());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_json_lines_row_format() {
        let row = StoredRow {
            machine_id: 3,
            run_id: CONTINUOUS_RUN_ID,
            sample: sample(5),
        };
        let json = serde_json::to_value(row).unwrap();
        assert_eq!(json["machine_id"], 3);
        assert_eq!(json["run_id"], 0);
        assert_eq!(json["timestamp_us"], 5);
    }
}
