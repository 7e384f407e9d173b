//! 持续状态记录器集成测试
//!
//! 验证后台采样/写入线程、暂停门控、故障容忍与清理。

use gantry_client::storage::{JsonLinesSink, MemorySink, StateSink};
use gantry_client::{
    CONTINUOUS_RUN_ID, ContinuousStateLogger, CraneBuilder, ExecutorConfig, LoggerConfig,
    StateLogger, StorageError, Waypoint, WaypointExecutor,
};
use gantry_driver::{LogSample, MachineState, SimulatedMotor};
use gantry_tools::{CraneConfig, now_us};
use serial_test::serial;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn machine() -> Arc<MachineState> {
    CraneBuilder::new(CraneConfig::default())
        .cart_driver(Box::new(SimulatedMotor::new(65536)))
        .hoist_driver(Box::new(SimulatedMotor::new(65536)))
        .build()
        .unwrap()
}

fn fast_config() -> LoggerConfig {
    LoggerConfig {
        machine_id: 7,
        logging_interval: Duration::from_millis(5),
        write_interval: Duration::from_millis(20),
        buffer_size: 1000,
        join_timeout: Duration::from_secs(2),
    }
}

fn timestamps(sink: &MemorySink) -> Vec<u64> {
    sink.rows().iter().map(|r| r.sample.timestamp_us).collect()
}

fn new_logger<S>(sink: &S, config: LoggerConfig) -> ContinuousStateLogger
where
    S: StateSink + Clone + 'static,
{
    ContinuousStateLogger::new(machine(), Box::new(sink.clone()), config)
}

/// 每次写入都卡住一段时间的后端
struct StuckSink {
    entered: Arc<AtomicBool>,
    hold: Duration,
}

impl StateSink for StuckSink {
    fn store_state(
        &mut self,
        _machine_id: i64,
        _run_id: i64,
        _samples: &[LogSample],
    ) -> Result<(), StorageError> {
        self.entered.store(true, Ordering::SeqCst);
        thread::sleep(self.hold);
        Ok(())
    }

    fn cleanup_continuous_logging(
        &mut self,
        _since_us: u64,
        _machine_id: i64,
    ) -> Result<(), StorageError> {
        Ok(())
    }
}

#[test]
#[serial]
fn test_background_logging_writes_rows() {
    let sink = MemorySink::new();
    let mut logger = new_logger(&sink, fast_config());

    logger.start().unwrap();
    assert!(logger.is_running());
    thread::sleep(Duration::from_millis(200));
    logger.stop();
    assert!(!logger.is_running());

    let rows = sink.rows();
    assert!(rows.len() >= 10, "only {} rows", rows.len());
    assert!(rows.iter().all(|r| r.run_id == CONTINUOUS_RUN_ID && r.machine_id == 7));

    let stamps = timestamps(&sink);
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert!(stamps[0] >= logger.session_start_us());

    // 停止时已 flush，没有遗留
    assert_eq!(logger.queue_len(), 0);
    let metrics = logger.metrics();
    assert_eq!(metrics.rows_written as usize, rows.len());
    assert!(metrics.batches_written >= 2);
    assert_eq!(metrics.samples_dropped, 0);
}

#[test]
#[serial]
fn test_pause_stops_sampling_and_flushes() {
    let sink = MemorySink::new();
    let mut logger = new_logger(&sink, fast_config());
    logger.start().unwrap();
    thread::sleep(Duration::from_millis(50));

    logger.pause();
    assert!(logger.is_paused());
    assert_eq!(logger.queue_len(), 0);
    let queued = logger.metrics().samples_queued;
    let rows = sink.len();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(logger.metrics().samples_queued, queued);
    assert_eq!(sink.len(), rows);

    logger.resume();
    assert!(!logger.is_paused());
    thread::sleep(Duration::from_millis(100));
    assert!(logger.metrics().samples_queued > queued);

    logger.stop();
}

#[test]
#[serial]
fn test_no_samples_during_execution() {
    let machine = machine();
    let sink = MemorySink::new();
    let mut logger =
        ContinuousStateLogger::new(machine.clone(), Box::new(sink.clone()), fast_config());
    logger.start().unwrap();
    thread::sleep(Duration::from_millis(50));

    let executor = WaypointExecutor::new(machine, ExecutorConfig::default());
    let begin = now_us();
    executor
        .execute_with_logger(
            &[
                Waypoint::new(0.0, 0.0, 0.0),
                Waypoint::new(0.15, 10.0, 50.0),
                Waypoint::new(0.3, 20.0, 0.0),
            ],
            &logger,
        )
        .unwrap();
    let end = now_us();
    assert!(!logger.is_paused());

    thread::sleep(Duration::from_millis(50));
    logger.stop();

    let margin = 5_000;
    let inside: Vec<u64> = timestamps(&sink)
        .into_iter()
        .filter(|ts| *ts > begin + margin && *ts + margin < end)
        .collect();
    assert!(inside.is_empty(), "samples during execution: {:?}", inside);
    // 执行结束后恢复记录
    assert!(timestamps(&sink).iter().any(|ts| *ts >= end));
}

#[test]
#[serial]
fn test_execution_keeps_caller_pause() {
    let machine = machine();
    let sink = MemorySink::new();
    let mut logger =
        ContinuousStateLogger::new(machine.clone(), Box::new(sink.clone()), fast_config());
    logger.start().unwrap();
    logger.pause();

    let executor = WaypointExecutor::new(machine, ExecutorConfig::default());
    executor
        .execute_with_logger(
            &[Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(0.05, 2.0, 0.0)],
            &logger,
        )
        .unwrap();
    assert!(logger.is_paused());

    let queued = logger.metrics().samples_queued;
    thread::sleep(Duration::from_millis(50));
    assert_eq!(logger.metrics().samples_queued, queued);
    logger.stop();
}

#[test]
#[serial]
fn test_duplicate_timestamps_written_once() {
    let sink = MemorySink::new();
    let logger = new_logger(&sink, fast_config());

    let sample = |ts: u64, x: f64| LogSample {
        timestamp_us: ts,
        cart_pos_m: x,
        ..Default::default()
    };
    logger.record(sample(1_000, 0.1));
    logger.record(sample(1_000, 0.2));
    logger.record(sample(2_000, 0.3));
    logger.flush();

    let rows = sink.rows();
    assert_eq!(rows.len(), 2);
    // 保留先入队的那一个
    assert_eq!(rows[0].sample.cart_pos_m, 0.1);
    assert_eq!(logger.metrics().duplicates_suppressed, 1);
}

#[test]
#[serial]
fn test_full_queue_drops_newest() {
    let config = LoggerConfig {
        buffer_size: 3,
        ..fast_config()
    };
    let sink = MemorySink::new();
    let logger = new_logger(&sink, config);

    for ts in 1..=5 {
        logger.record(LogSample {
            timestamp_us: ts,
            ..Default::default()
        });
    }
    logger.flush();

    assert_eq!(timestamps(&sink), vec![1, 2, 3]);
    let metrics = logger.metrics();
    assert_eq!(metrics.samples_dropped, 2);
    assert!((metrics.drop_rate() - 40.0).abs() < 1e-9);
}

#[test]
#[serial]
fn test_write_failures_do_not_stop_logging() {
    let sink = MemorySink::new();
    sink.set_failing(true);
    let mut logger = new_logger(&sink, fast_config());
    logger.start().unwrap();

    thread::sleep(Duration::from_millis(100));
    assert!(logger.metrics().write_failures > 0);
    assert!(logger.is_running());
    assert!(sink.is_empty());

    sink.set_failing(false);
    thread::sleep(Duration::from_millis(100));
    logger.stop();
    assert!(!sink.is_empty());
}

#[test]
#[serial]
fn test_cleanup_session_removes_only_continuous_rows() {
    let sink = MemorySink::new();
    let mut logger = new_logger(&sink, fast_config());

    // 会话开始前的行
    let mut writer = sink.clone();
    let earlier = LogSample {
        timestamp_us: 1,
        ..Default::default()
    };
    writer.store_state(7, CONTINUOUS_RUN_ID, &[earlier]).unwrap();

    logger.start().unwrap();
    thread::sleep(Duration::from_millis(60));
    logger.stop();

    // 会话期间的离散轨迹行
    let discrete = LogSample {
        timestamp_us: now_us(),
        ..Default::default()
    };
    writer.store_state(7, 42, &[discrete]).unwrap();
    assert!(sink.len() > 2);

    logger.cleanup_session();

    let remaining: Vec<(i64, u64)> = sink
        .rows()
        .iter()
        .map(|r| (r.run_id, r.sample.timestamp_us))
        .collect();
    assert_eq!(
        remaining,
        vec![(CONTINUOUS_RUN_ID, 1), (42, discrete.timestamp_us)]
    );
}

#[test]
#[serial]
fn test_cleanup_failure_is_swallowed() {
    let sink = MemorySink::new();
    let logger = new_logger(&sink, fast_config());
    sink.set_failing(true);
    logger.cleanup(0);
}

#[test]
#[serial]
fn test_drop_stops_threads_and_flushes() {
    let sink = MemorySink::new();
    {
        let mut logger = new_logger(&sink, fast_config());
        logger.start().unwrap();
        thread::sleep(Duration::from_millis(30));
    }
    let rows = sink.len();
    assert!(rows > 0);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sink.len(), rows);
}

#[test]
#[serial]
fn test_json_lines_backend() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.jsonl");
    let sink = JsonLinesSink::open(&path).unwrap();

    let mut logger = new_logger(&sink, fast_config());
    logger.start().unwrap();
    thread::sleep(Duration::from_millis(60));
    logger.stop();

    let rows = sink.read_rows().unwrap();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r.machine_id == 7));
    // 小车未运动
    assert!(rows.iter().all(|r| r.sample.cart_pos_m == 0.0));

    logger.cleanup_session();
    assert!(sink.read_rows().unwrap().is_empty());
}

#[test]
#[serial]
fn test_stuck_sink_does_not_block_pause_or_stop() {
    let entered = Arc::new(AtomicBool::new(false));
    let sink = StuckSink {
        entered: entered.clone(),
        hold: Duration::from_secs(3),
    };
    let config = LoggerConfig {
        join_timeout: Duration::from_millis(100),
        ..fast_config()
    };
    let mut logger = ContinuousStateLogger::new(machine(), Box::new(sink), config);
    logger.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(1);
    while !entered.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "writer never reached the sink");
        thread::sleep(Duration::from_millis(5));
    }
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    logger.pause();
    assert!(start.elapsed() < Duration::from_secs(1), "pause took {:?}", start.elapsed());
    assert!(logger.is_paused());

    let start = Instant::now();
    logger.stop();
    assert!(start.elapsed() < Duration::from_secs(1), "stop took {:?}", start.elapsed());
    assert!(!logger.is_running());
}

#[test]
#[serial]
fn test_restart_after_stop_keeps_logging() {
    let sink = MemorySink::new();
    let mut logger = new_logger(&sink, fast_config());

    logger.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    logger.stop();

    logger.start().unwrap();
    assert!(logger.is_running());
    let rows = sink.len();
    thread::sleep(Duration::from_millis(100));
    assert!(sink.len() > rows);

    logger.stop();
    assert!(!logger.is_running());
    let stamps = timestamps(&sink);
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
}
