//! 持续状态记录
//!
//! 两个后台线程共享一个有界队列：
//!
//! - **采样线程**: 每 `logging_interval` 取一次整机快照并入队；队列满时丢弃新样本并告警，从不阻塞
//! - **写入线程**: 每 `write_interval` 取出全部排队样本，按时间戳去重后一次性写入持久化后端；
//!   写入失败只记录日志，该批次丢失
//!
//! 暂停期间两个线程都保持存活但不做任何工作。`pause()` 会等待正在进行的采样结束并立即 `flush()`，
//! 返回之后不会再有新样本入队，执行器可以独占整机状态。
//!
//! 持续记录是尽力而为的遥测：这里的任何故障都不会传播给调用方，
//! 只体现在日志和 [`LoggerMetrics`] 中。

mod metrics;
mod queue;

pub use metrics::{LoggerMetrics, LoggerMetricsSnapshot};
pub use queue::SampleQueue;

use crate::storage::{CONTINUOUS_RUN_ID, StateSink};
use gantry_driver::{LogSample, MachineState};
use gantry_tools::{CraneConfig, dedup_keep_first, now_us};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 带超时的线程 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程代为 join；超时后它继续等待，随进程退出
        thread::spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(io::Error::new(
                io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 记录器配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoggerConfig {
    /// 写入持久化后端时使用的机器 ID
    pub machine_id: i64,
    /// 采样周期
    pub logging_interval: Duration,
    /// 写入周期
    pub write_interval: Duration,
    /// 队列容量
    pub buffer_size: usize,
    /// 停止时等待线程退出的时限
    pub join_timeout: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            machine_id: 1,
            logging_interval: Duration::from_millis(10),
            write_interval: Duration::from_millis(100),
            buffer_size: 1000,
            join_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&CraneConfig> for LoggerConfig {
    fn from(config: &CraneConfig) -> Self {
        Self {
            machine_id: config.machine_id,
            logging_interval: config.logger.logging_interval(),
            write_interval: config.logger.write_interval(),
            buffer_size: config.logger.buffer_size,
            join_timeout: config.logger.join_timeout(),
        }
    }
}

/// 记录器能力
///
/// 控制流程只依赖这个 trait，可以换成 [`NullStateLogger`] 关闭记录。
pub trait StateLogger: Send {
    /// 启动后台线程
    fn start(&mut self) -> io::Result<()>;
    /// 停止后台线程；线程都按时退出时写出剩余样本
    fn stop(&mut self);
    /// 暂停（随即 flush）
    fn pause(&self);
    /// 恢复
    fn resume(&self);
    /// 立即写出所有排队样本
    fn flush(&self);
    /// 删除 `since_us` 之后本机的持续记录行
    fn cleanup(&self, since_us: u64);
    fn is_running(&self) -> bool;
    fn is_paused(&self) -> bool;
}

/// 空记录器：所有操作都是空操作
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStateLogger;

impl StateLogger for NullStateLogger {
    fn start(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn pause(&self) {}

    fn resume(&self) {}

    fn flush(&self) {}

    fn cleanup(&self, _since_us: u64) {}

    fn is_running(&self) -> bool {
        false
    }

    fn is_paused(&self) -> bool {
        false
    }
}

/// 两个工作线程共享的状态
struct LoggerShared {
    machine: Arc<MachineState>,
    sink: Mutex<Box<dyn StateSink>>,
    queue: SampleQueue,
    machine_id: i64,
    paused: AtomicBool,
    /// 采样线程在一次采样期间持有；`pause()` 借此等待进行中的采样结束
    sample_gate: Mutex<()>,
    metrics: LoggerMetrics,
}

impl LoggerShared {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// 采样线程的一个周期
    fn sample_tick(&self) {
        let _gate = self.sample_gate.lock();
        // 在门内复查，保证 pause() 返回后不再入队
        if self.is_paused() {
            return;
        }

        match self.machine.get_snapshot() {
            Ok(snapshot) => {
                let sample = snapshot.to_log_sample(now_us());
                self.enqueue(sample);
            },
            Err(e) => {
                LoggerMetrics::add(&self.metrics.snapshot_failures, 1);
                warn!("Continuous logging snapshot failed: {}", e);
            },
        }
    }

    fn enqueue(&self, sample: LogSample) -> bool {
        if self.queue.try_push(sample) {
            LoggerMetrics::add(&self.metrics.samples_queued, 1);
            true
        } else {
            LoggerMetrics::add(&self.metrics.samples_dropped, 1);
            warn!(
                "Continuous logging queue full ({} samples), dropping newest sample",
                self.queue.capacity()
            );
            false
        }
    }

    /// 取出排队样本，去重后写一个批次
    ///
    /// 先拿到后端锁再取样本；`lock_timeout` 内拿不到锁时样本留在队列中。返回写入的行数。
    fn write_pending(&self, lock_timeout: Option<Duration>) -> usize {
        let mut sink = match lock_timeout {
            Some(timeout) => match self.sink.try_lock_for(timeout) {
                Some(sink) => sink,
                None => {
                    warn!(
                        "State sink busy for {:?}, leaving {} samples queued",
                        timeout,
                        self.queue.len()
                    );
                    return 0;
                },
            },
            None => self.sink.lock(),
        };

        let mut batch = self.queue.drain();
        if batch.is_empty() {
            return 0;
        }

        let duplicates = dedup_keep_first(&mut batch, |s| s.timestamp_us);
        if duplicates > 0 {
            LoggerMetrics::add(&self.metrics.duplicates_suppressed, duplicates as u64);
            warn!("Suppressed {} samples with duplicate timestamps", duplicates);
        }

        let result = sink.store_state(self.machine_id, CONTINUOUS_RUN_ID, &batch);
        drop(sink);
        match result {
            Ok(()) => {
                LoggerMetrics::add(&self.metrics.batches_written, 1);
                LoggerMetrics::add(&self.metrics.rows_written, batch.len() as u64);
                trace!("Stored {} continuous logging samples", batch.len());
                batch.len()
            },
            Err(e) => {
                LoggerMetrics::add(&self.metrics.write_failures, 1);
                error!(
                    "Failed to store {} continuous logging samples: {}",
                    batch.len(),
                    e
                );
                0
            },
        }
    }
}

/// 以固定周期运行 `tick`，直到本会话的 `running` 被清除
///
/// 使用绝对时间锚点，扣除每个周期内的耗时；超时则重置锚点。
fn run_periodic(
    shared: &LoggerShared,
    running: &AtomicBool,
    period: Duration,
    name: &str,
    mut tick: impl FnMut(&LoggerShared),
) {
    debug!("{} thread started (period {:?})", name, period);
    let mut next_tick = Instant::now();

    while running.load(Ordering::Acquire) {
        if !shared.is_paused() {
            tick(shared);
        }

        next_tick += period;
        let now = Instant::now();
        if next_tick > now {
            spin_sleep::sleep(next_tick - now);
        } else {
            trace!("{} overrun by {:?}", name, now - next_tick);
            next_tick = now;
        }
    }
    debug!("{} thread exiting", name);
}

/// 持续状态记录器
///
/// # 示例
///
/// ```rust,no_run
/// use gantry_client::logger::{ContinuousStateLogger, LoggerConfig, StateLogger};
/// use gantry_client::storage::MemorySink;
/// # fn demo(machine: std::sync::Arc<gantry_driver::MachineState>) -> std::io::Result<()> {
/// let sink = Box::new(MemorySink::new());
/// let mut logger = ContinuousStateLogger::new(machine, sink, LoggerConfig::default());
/// logger.start()?;
///
/// logger.pause(); // 执行轨迹前
/// // ... executor.execute(..)
/// logger.resume();
///
/// logger.stop();
/// # Ok(())
/// # }
/// ```
pub struct ContinuousStateLogger {
    shared: Arc<LoggerShared>,
    config: LoggerConfig,
    /// 当前会话的运行标志；每次 `start()` 新建，未 join 成功的旧线程仍看着自己那一份
    session: Option<Arc<AtomicBool>>,
    sampler: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    session_start_us: u64,
}

impl ContinuousStateLogger {
    pub fn new(
        machine: Arc<MachineState>,
        sink: Box<dyn StateSink>,
        config: LoggerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(LoggerShared {
                machine,
                sink: Mutex::new(sink),
                queue: SampleQueue::new(config.buffer_size),
                machine_id: config.machine_id,
                paused: AtomicBool::new(false),
                sample_gate: Mutex::new(()),
                metrics: LoggerMetrics::new(),
            }),
            config,
            session: None,
            sampler: None,
            writer: None,
            session_start_us: 0,
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// 本次会话开始时间（Unix 微秒），未启动时为 0
    pub fn session_start_us(&self) -> u64 {
        self.session_start_us
    }

    /// 删除本次会话写入的持续记录行
    pub fn cleanup_session(&self) {
        self.cleanup(self.session_start_us);
    }

    /// 由外部生产者直接入队一个样本（与采样线程相同的丢弃策略）
    pub fn record(&self, sample: LogSample) -> bool {
        self.shared.enqueue(sample)
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn metrics(&self) -> LoggerMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    fn spawn_worker(
        &self,
        running: &Arc<AtomicBool>,
        name: &'static str,
        period: Duration,
        tick: fn(&LoggerShared),
    ) -> io::Result<JoinHandle<()>> {
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(running);
        thread::Builder::new()
            .name(format!("gantry-log-{}", name))
            .spawn(move || run_periodic(&shared, &running, period, name, tick))
    }

    /// 等待两个工作线程退出；任一线程超时或 panic 时返回 false
    fn join_workers(&mut self) -> bool {
        let timeout = self.config.join_timeout;
        let mut all_joined = true;
        for (name, handle) in [("sampler", self.sampler.take()), ("writer", self.writer.take())] {
            if let Some(handle) = handle {
                if let Err(_e) = handle.join_timeout(timeout) {
                    all_joined = false;
                    error!(
                        "Logger {} thread panicked or failed to shut down within {:?}",
                        name, timeout
                    );
                }
            }
        }
        all_joined
    }
}

impl StateLogger for ContinuousStateLogger {
    fn start(&mut self) -> io::Result<()> {
        if self.is_running() {
            warn!("Continuous logger already running");
            return Ok(());
        }

        self.session_start_us = now_us();
        self.shared.paused.store(false, Ordering::Release);
        let running = Arc::new(AtomicBool::new(true));
        self.session = Some(Arc::clone(&running));

        let started = self
            .spawn_worker(
                &running,
                "sampler",
                self.config.logging_interval,
                LoggerShared::sample_tick,
            )
            .and_then(|sampler| {
                self.sampler = Some(sampler);
                self.spawn_worker(&running, "writer", self.config.write_interval, |shared| {
                    shared.write_pending(None);
                })
            });

        match started {
            Ok(writer) => {
                self.writer = Some(writer);
                info!(
                    "Continuous logger started ({:?} sampling, {:?} writing, capacity {})",
                    self.config.logging_interval,
                    self.config.write_interval,
                    self.config.buffer_size
                );
                Ok(())
            },
            Err(e) => {
                error!("Failed to start continuous logger: {}", e);
                running.store(false, Ordering::Release);
                self.session = None;
                self.join_workers();
                Err(e)
            },
        }
    }

    fn stop(&mut self) {
        let was_running = self
            .session
            .take()
            .is_some_and(|running| running.swap(false, Ordering::AcqRel));

        if self.join_workers() {
            self.flush();
        } else {
            // 卡住的写入线程可能仍持有后端，放弃剩余样本
            error!(
                "Abandoning {} queued continuous logging samples after failed shutdown",
                self.queue_len()
            );
        }

        if was_running {
            let m = self.metrics();
            info!(
                "Continuous logger stopped: {} rows written, {} dropped, {} write failures",
                m.rows_written, m.samples_dropped, m.write_failures
            );
        }
    }

    fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
        // 等待进行中的采样结束
        drop(self.shared.sample_gate.lock());
        self.flush();
        debug!("Continuous logger paused");
    }

    fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
        debug!("Continuous logger resumed");
    }

    fn flush(&self) {
        let written = self.shared.write_pending(Some(self.config.join_timeout));
        if written > 0 {
            debug!("Flushed {} continuous logging samples", written);
        }
    }

    fn cleanup(&self, since_us: u64) {
        let timeout = self.config.join_timeout;
        let Some(mut sink) = self.shared.sink.try_lock_for(timeout) else {
            error!("Continuous logging cleanup skipped: state sink busy for {:?}", timeout);
            return;
        };
        let result = sink.cleanup_continuous_logging(since_us, self.shared.machine_id);
        drop(sink);
        match result {
            Ok(()) => info!(
                "Cleaned up continuous logging for machine {} since {} us",
                self.shared.machine_id, since_us
            ),
            Err(e) => error!("Continuous logging cleanup failed: {}", e),
        }
    }

    fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|running| running.load(Ordering::Acquire))
    }

    fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }
}

impl Drop for ContinuousStateLogger {
    fn drop(&mut self) {
        if self.session.is_some() || self.sampler.is_some() || self.writer.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySink;
    use gantry_driver::{
        Axis, AxisCalibration, AxisId, NullMotor, NullSensorLink, SensorCalibration,
        SensorChannel,
    };

    fn machine() -> Arc<MachineState> {
        let cal = AxisCalibration::from_pulley(65536, 40.0, 700.0);
        Arc::new(MachineState::new(
            Axis::new(AxisId::Cart, Box::new(NullMotor), cal),
            Axis::new(AxisId::Hoist, Box::new(NullMotor), cal.with_direction(-1)),
            SensorChannel::new(Box::new(NullSensorLink), SensorCalibration::default()),
            350.0,
        ))
    }

    fn sample(ts: u64) -> LogSample {
        LogSample {
            timestamp_us: ts,
            ..Default::default()
        }
    }

    fn logger_with(sink: &MemorySink, config: LoggerConfig) -> ContinuousStateLogger {
        ContinuousStateLogger::new(machine(), Box::new(sink.clone()), config)
    }

    #[test]
    fn test_write_pending_dedups_timestamps() {
        let sink = MemorySink::new();
        let logger = logger_with(&sink, LoggerConfig::default());

        logger.record(sample(100));
        logger.record(sample(100));
        logger.record(sample(101));
        logger.flush();

        let stamps: Vec<u64> = sink.rows().iter().map(|r| r.sample.timestamp_us).collect();
        assert_eq!(stamps, vec![100, 101]);
        assert!(sink.rows().iter().all(|r| r.run_id == CONTINUOUS_RUN_ID));
        assert_eq!(sink.store_calls(), 1);
        assert_eq!(logger.metrics().duplicates_suppressed, 1);
    }

    #[test]
    fn test_write_failure_drops_batch() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        let logger = logger_with(&sink, LoggerConfig::default());

        logger.record(sample(1));
        logger.flush();
        assert_eq!(logger.metrics().write_failures, 1);
        assert_eq!(logger.queue_len(), 0);

        // 后续批次照常写入
        sink.set_failing(false);
        logger.record(sample(2));
        logger.flush();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_backpressure_drops_newest() {
        let config = LoggerConfig {
            buffer_size: 4,
            ..Default::default()
        };
        let logger = ContinuousStateLogger::new(machine(), Box::new(MemorySink::new()), config);
        for ts in 0..4 {
            assert!(logger.record(sample(ts)));
        }
        assert!(!logger.record(sample(4)));
        assert_eq!(logger.queue_len(), 4);
        assert_eq!(logger.metrics().samples_dropped, 1);
    }

    #[test]
    fn test_empty_flush_does_not_call_sink() {
        let sink = MemorySink::new();
        let logger = logger_with(&sink, LoggerConfig::default());
        logger.flush();
        assert_eq!(sink.store_calls(), 0);
    }

    #[test]
    fn test_flush_gives_up_on_busy_sink() {
        let sink = MemorySink::new();
        let config = LoggerConfig {
            join_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let logger = logger_with(&sink, config);
        logger.record(sample(1));

        let held = logger.shared.sink.lock();
        let start = Instant::now();
        logger.flush();
        assert!(start.elapsed() < Duration::from_millis(500));
        drop(held);

        // 样本留在队列中，后端空闲后写出
        assert_eq!(logger.queue_len(), 1);
        assert_eq!(sink.store_calls(), 0);
        logger.flush();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_null_logger_is_inert() {
        let mut logger = NullStateLogger;
        logger.start().unwrap();
        logger.pause();
        assert!(!logger.is_paused());
        assert!(!logger.is_running());
        logger.stop();
    }
}
