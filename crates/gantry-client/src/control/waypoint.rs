//! 航点与实测轨迹

use crate::error::ExecutorError;
use serde::{Deserialize, Serialize};

/// 首个航点时间允许的偏差（秒）
const START_TIME_TOLERANCE_S: f64 = 1e-6;

/// 轨迹上的一个调度点
///
/// 执行器只使用 `t`、`x`、`v`；其余字段由轨迹生成器给出，原样保留。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// 调度时刻（秒，相对起点）
    pub t: f64,
    /// 位置（mm）
    pub x: f64,
    /// 速度（mm/s）
    pub v: f64,
    /// 加速度（mm/s²）
    #[serde(default)]
    pub a: f64,
    /// 绳长
    #[serde(default)]
    pub rope_length: f64,
    /// 绳长变化率
    #[serde(default)]
    pub dr: f64,
    /// 绳长二阶导
    #[serde(default)]
    pub ddr: f64,
}

impl Waypoint {
    pub fn new(t: f64, x: f64, v: f64) -> Self {
        Self {
            t,
            x,
            v,
            ..Default::default()
        }
    }
}

/// 校验轨迹
///
/// - 至少两个航点
/// - `t`、`x`、`v` 均为有限值
/// - 首个航点 `t == 0`
/// - `t` 单调不减
pub fn validate_waypoints(waypoints: &[Waypoint]) -> Result<(), ExecutorError> {
    if waypoints.len() < 2 {
        return Err(ExecutorError::InvalidTrajectory(format!(
            "need at least 2 waypoints, got {}",
            waypoints.len()
        )));
    }

    for (i, wp) in waypoints.iter().enumerate() {
        if !(wp.t.is_finite() && wp.x.is_finite() && wp.v.is_finite()) {
            return Err(ExecutorError::InvalidTrajectory(format!(
                "waypoint {} has non-finite values",
                i
            )));
        }
    }

    if waypoints[0].t.abs() > START_TIME_TOLERANCE_S {
        return Err(ExecutorError::InvalidTrajectory(format!(
            "first waypoint must start at t=0, got {}",
            waypoints[0].t
        )));
    }

    if let Some(i) = waypoints.windows(2).position(|w| w[1].t < w[0].t) {
        return Err(ExecutorError::InvalidTrajectory(format!(
            "waypoint {} goes back in time ({} < {})",
            i + 1,
            waypoints[i + 1].t,
            waypoints[i].t
        )));
    }

    Ok(())
}

/// 实测轨迹的一行（SI 单位）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    /// 相对起点的时间（秒，已取整到微秒）
    pub t: f64,
    /// 位置（m）
    pub x: f64,
    /// 速度（m/s）
    pub v: f64,
    /// 加速度（未测量，恒为 0）
    pub a: f64,
    /// 摆角（rad）
    pub theta: f64,
    /// 摆角角速度（rad/s）
    pub omega: f64,
    /// 风速
    pub wind_speed: f64,
}

/// 实测轨迹
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasuredTrajectory {
    samples: Vec<TrajectorySample>,
}

impl MeasuredTrajectory {
    pub fn new(samples: Vec<TrajectorySample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<TrajectorySample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn column(&self, f: impl Fn(&TrajectorySample) -> f64) -> Vec<f64> {
        self.samples.iter().map(f).collect()
    }

    pub fn times(&self) -> Vec<f64> {
        self.column(|s| s.t)
    }

    pub fn positions(&self) -> Vec<f64> {
        self.column(|s| s.x)
    }

    pub fn velocities(&self) -> Vec<f64> {
        self.column(|s| s.v)
    }

    pub fn accelerations(&self) -> Vec<f64> {
        self.column(|s| s.a)
    }

    pub fn angles(&self) -> Vec<f64> {
        self.column(|s| s.theta)
    }

    pub fn angular_velocities(&self) -> Vec<f64> {
        self.column(|s| s.omega)
    }

    pub fn wind_speeds(&self) -> Vec<f64> {
        self.column(|s| s.wind_speed)
    }

    /// 最后一行的时间（秒）
    pub fn duration(&self) -> f64 {
        self.samples.last().map_or(0.0, |s| s.t)
    }

    /// 最后一行的位置（m）
    pub fn final_position_m(&self) -> Option<f64> {
        self.samples.last().map(|s| s.x)
    }
}
