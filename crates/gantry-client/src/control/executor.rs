//! 航点执行器
//!
//! 通过调节速度上限来整形一次连续的轴运动：
//!
//! 1. **Configuring**: 位置模式，加速度放开到最大，速度上限取第二个航点的 `|v|`，
//!    位置目标一次性设为最后一个航点的 `x`（之后不再下发位置目标）
//! 2. **Executing**: 对每个后续航点忙等到 `t`，更新速度上限为 `|v|`，随即采一次整机快照
//! 3. **Complete**: 力矩模式 + 零力矩，释放保持力矩
//!
//! 任何轴通讯错误都会立即中止（`Aborted`），尽力释放轴并把错误交给调用方。
//!
//! # 时序
//!
//! 忙等而非睡眠，调度抖动在微秒级；代价是执行期间占满一个 CPU 核。
//! 每次自旋都会检查 [`CancelToken`]。

use crate::control::cancel::CancelToken;
use crate::control::waypoint::{
    MeasuredTrajectory, TrajectorySample, Waypoint, validate_waypoints,
};
use crate::error::ExecutorError;
use crate::logger::StateLogger;
use gantry_driver::{AxisCalibration, AxisId, MAX_ACCEL_LIMIT, MachineState, SensorCalibration};
use gantry_tools::{dedup_keep_first, round_to_us, secs_to_us};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 执行器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ExecutorState {
    #[default]
    Idle = 0,
    Configuring = 1,
    Executing = 2,
    Complete = 3,
    Aborted = 4,
}

impl ExecutorState {
    /// 从 u8 转换（无效值视为 Idle）
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Configuring,
            2 => Self::Executing,
            3 => Self::Complete,
            4 => Self::Aborted,
            _ => Self::Idle,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 是否有轨迹正在执行
    pub fn is_active(self) -> bool {
        matches!(self, Self::Configuring | Self::Executing)
    }
}

/// 执行器状态（原子版本，可跨线程观察）
#[derive(Debug, Default)]
pub struct AtomicExecutorState {
    inner: AtomicU8,
}

impl AtomicExecutorState {
    pub fn new(state: ExecutorState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> ExecutorState {
        ExecutorState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ExecutorState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }

    /// 从任意非活动状态切换到 `Configuring`
    ///
    /// 已有执行在进行时返回 false。
    pub fn try_begin(&self) -> bool {
        self.inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if ExecutorState::from_u8(current).is_active() {
                    None
                } else {
                    Some(ExecutorState::Configuring.as_u8())
                }
            })
            .is_ok()
    }
}

/// 执行器配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutorConfig {
    /// 被驱动的轴
    pub driven_axis: AxisId,
    /// 执行期间的加速度上限（设备单位）
    pub max_acceleration: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            driven_axis: AxisId::Cart,
            max_acceleration: MAX_ACCEL_LIMIT,
        }
    }
}

/// 执行期间记录的原始一行（设备单位）
#[derive(Debug, Clone, Copy)]
struct RawSample {
    t: f64,
    position_counts: i32,
    velocity: i32,
    angle: f32,
    angular_velocity: f32,
    wind_speed: f32,
}

/// 航点执行器
///
/// 在调用线程上同步执行，整个轨迹时长内阻塞。
///
/// # 示例
///
/// ```rust,no_run
/// use gantry_client::control::{ExecutorConfig, Waypoint, WaypointExecutor};
/// # use std::sync::Arc;
/// # use gantry_client::ExecutorError;
/// # fn demo(machine: Arc<gantry_driver::MachineState>) -> Result<(), ExecutorError> {
/// let executor = WaypointExecutor::new(machine, ExecutorConfig::default());
/// let trajectory = executor.execute(&[
///     Waypoint::new(0.0, 0.0, 0.0),
///     Waypoint::new(0.5, 100.0, 200.0),
///     Waypoint::new(1.0, 200.0, 0.0),
/// ])?;
/// println!("{} rows, final x = {:?} m", trajectory.len(), trajectory.final_position_m());
/// # Ok(())
/// # }
/// ```
pub struct WaypointExecutor {
    machine: Arc<MachineState>,
    config: ExecutorConfig,
    state: AtomicExecutorState,
    cancel: CancelToken,
}

impl WaypointExecutor {
    pub fn new(machine: Arc<MachineState>, config: ExecutorConfig) -> Self {
        Self {
            machine,
            config,
            state: AtomicExecutorState::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// 当前状态
    pub fn state(&self) -> ExecutorState {
        self.state.get()
    }

    /// 取消令牌（克隆体可交给其他线程，如 Ctrl-C 处理器）
    ///
    /// 每次 `execute` 开始时标志会被清除。
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 执行轨迹
    pub fn execute(&self, waypoints: &[Waypoint]) -> Result<MeasuredTrajectory, ExecutorError> {
        validate_waypoints(waypoints)?;

        if !self.state.try_begin() {
            return Err(ExecutorError::AlreadyRunning);
        }
        self.cancel.reset();

        let axis = self.config.driven_axis;
        info!(
            "Executing {} waypoints on {} axis ({:.3} s)",
            waypoints.len(),
            axis,
            waypoints[waypoints.len() - 1].t
        );

        match self.run(waypoints) {
            Ok(raw) => {
                self.state.set(ExecutorState::Complete);
                let trajectory = self.post_process(raw);
                info!("Trajectory complete: {} samples", trajectory.len());
                Ok(trajectory)
            },
            Err(e) => {
                self.state.set(ExecutorState::Aborted);
                error!("Trajectory aborted: {}", e);
                if let Err(release_err) = self.machine.with_axis(axis, |a| a.release()) {
                    error!("Failed to release {} axis after abort: {}", axis, release_err);
                }
                Err(e)
            },
        }
    }

    /// 暂停记录器 → 执行 → 恢复记录器
    ///
    /// 只恢复由这里暂停的记录器；调用前已暂停的保持暂停。无论执行成功与否都会恢复。
    pub fn execute_with_logger(
        &self,
        waypoints: &[Waypoint],
        logger: &dyn StateLogger,
    ) -> Result<MeasuredTrajectory, ExecutorError> {
        let paused_here = !logger.is_paused();
        if paused_here {
            logger.pause();
        }
        let result = self.execute(waypoints);
        if paused_here {
            logger.resume();
        }
        result
    }

    fn run(&self, waypoints: &[Waypoint]) -> Result<Vec<RawSample>, ExecutorError> {
        let axis = self.config.driven_axis;
        let calibration = self.machine.axis_calibration(axis);
        let final_target = calibration.mm_to_counts(waypoints[waypoints.len() - 1].x);
        let initial_limit = calibration.velocity_limit(waypoints[1].v);

        // Configuring
        let start_counts = self.machine.with_axis(axis, |a| {
            a.set_position_mode()?;
            let start = a.get_position_counts()?;
            a.set_accel_limit(self.config.max_acceleration)?;
            a.set_velocity_limit(initial_limit)?;
            a.set_position(final_target)?;
            Ok::<_, ExecutorError>(start)
        })?;
        debug!(
            "Configured {}: start {} counts, target {} counts, velocity limit {}",
            axis, start_counts, final_target, initial_limit
        );

        let mut raw = Vec::with_capacity(waypoints.len());
        raw.push(RawSample {
            t: 0.0,
            position_counts: start_counts,
            velocity: 0,
            angle: 0.0,
            angular_velocity: 0.0,
            wind_speed: 0.0,
        });

        // Executing
        self.state.set(ExecutorState::Executing);
        let t0 = Instant::now();

        for wp in &waypoints[1..] {
            self.wait_until(t0, wp.t)?;

            let limit = calibration.velocity_limit(wp.v);
            self.machine.with_axis(axis, |a| a.set_velocity_limit(limit))?;

            let t = t0.elapsed().as_secs_f64();
            let snapshot = self.machine.get_snapshot()?;
            let reading = match axis {
                AxisId::Cart => snapshot.cart,
                AxisId::Hoist => snapshot.hoist,
            };
            raw.push(RawSample {
                t,
                position_counts: reading.position_counts,
                velocity: reading.velocity,
                angle: snapshot.sensor.angle,
                angular_velocity: snapshot.sensor.angular_velocity,
                wind_speed: snapshot.sensor.wind_speed,
            });
        }

        // Complete
        self.machine.with_axis(axis, |a| a.release())?;
        Ok(raw)
    }

    /// 忙等到 `t0 + target_s`
    fn wait_until(&self, t0: Instant, target_s: f64) -> Result<(), ExecutorError> {
        loop {
            if self.cancel.is_cancelled() {
                warn!("Cancellation requested at t = {:.6} s", t0.elapsed().as_secs_f64());
                return Err(ExecutorError::Cancelled);
            }
            if t0.elapsed().as_secs_f64() >= target_s {
                return Ok(());
            }
            std::hint::spin_loop();
        }
    }

    fn post_process(&self, raw: Vec<RawSample>) -> MeasuredTrajectory {
        let axis_cal = self.machine.axis_calibration(self.config.driven_axis);
        let sensor_cal = self.machine.sensor_calibration();

        let mut samples: Vec<TrajectorySample> =
            raw.iter().map(|r| convert(r, &axis_cal, &sensor_cal)).collect();

        let removed = dedup_keep_first(&mut samples, |s| secs_to_us(s.t));
        if removed > 0 {
            warn!("Dropped {} trajectory rows with duplicate timestamps", removed);
        }
        MeasuredTrajectory::new(samples)
    }
}

fn convert(
    raw: &RawSample,
    axis: &AxisCalibration,
    sensor: &SensorCalibration,
) -> TrajectorySample {
    TrajectorySample {
        t: round_to_us(raw.t),
        x: axis.counts_to_mm(raw.position_counts) / 1000.0,
        v: axis.velocity_to_mm_s(raw.velocity) / 1000.0,
        a: 0.0,
        theta: sensor.to_radians(raw.angle),
        omega: sensor.to_radians(raw.angular_velocity),
        wind_speed: f64::from(raw.wind_speed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conversions() {
        for state in [
            ExecutorState::Idle,
            ExecutorState::Configuring,
            ExecutorState::Executing,
            ExecutorState::Complete,
            ExecutorState::Aborted,
        ] {
            assert_eq!(ExecutorState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ExecutorState::from_u8(200), ExecutorState::Idle);
        assert!(ExecutorState::Executing.is_active());
        assert!(!ExecutorState::Aborted.is_active());
    }

    #[test]
    fn test_try_begin_rejects_second_run() {
        let state = AtomicExecutorState::default();
        assert!(state.try_begin());
        assert_eq!(state.get(), ExecutorState::Configuring);
        assert!(!state.try_begin());

        state.set(ExecutorState::Aborted);
        assert!(state.try_begin());
    }

    #[test]
    fn test_convert_applies_calibration() {
        let axis = AxisCalibration::from_pulley(65536, 40.0, 700.0);
        let sensor = SensorCalibration::default();
        let raw = RawSample {
            t: 0.500_000_4,
            position_counts: 163_840,
            velocity: 300,
            angle: 0.806 * 10.0,
            angular_velocity: 0.0,
            wind_speed: 1.5,
        };
        let row = convert(&raw, &axis, &sensor);
        assert_eq!(row.t, 0.5);
        assert!((row.x - 0.1).abs() < 1e-12);
        assert!((row.v - 0.2).abs() < 1e-12);
        assert!((row.theta + 10f64.to_radians()).abs() < 1e-6);
        assert_eq!(row.wind_speed, 1.5);
    }
}
