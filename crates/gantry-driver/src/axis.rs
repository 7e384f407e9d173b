//! 单个直线轴（小车或卷扬）
//!
//! [`Axis`] 包装一个 [`MotorDriver`]，负责模式切换、限值设置，
//! 以及编码器计数与物理毫米之间的换算。

use crate::error::{DriverError, MotorError};
use crate::motor::{MotorDriver, MotorMode};
use std::fmt;
use tracing::trace;

/// 驱动器允许的最大加速度（设备单位，相当于不限制加速度）
pub const MAX_ACCEL_LIMIT: u32 = i32::MAX as u32;

/// 复位限值时使用的默认速度上限（设备单位）
pub const DEFAULT_VELOCITY_LIMIT: u32 = 2000;

/// 轴标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AxisId {
    /// 横向小车
    Cart,
    /// 卷扬（吊绳）
    Hoist,
}

impl AxisId {
    pub fn as_str(self) -> &'static str {
        match self {
            AxisId::Cart => "cart",
            AxisId::Hoist => "hoist",
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 轴的静态标定参数
///
/// - `counts_per_mm = encoder_counts / pulley_circumference_mm`
/// - `rpm_per_mm_per_s = 60 / pulley_circumference_mm`
/// - `direction_sign` 为 -1 时，物理方向与编码器方向相反（卷扬）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisCalibration {
    pub counts_per_mm: f64,
    pub rpm_per_mm_per_s: f64,
    pub position_limit_mm: f64,
    pub direction_sign: i8,
    pub calibrated: bool,
}

impl AxisCalibration {
    /// 由编码器分辨率和带轮周长计算标定参数
    ///
    /// # 示例
    ///
    /// ```rust
    /// use gantry_driver::AxisCalibration;
    ///
    /// let cal = AxisCalibration::from_pulley(65536, 40.0, 700.0);
    /// assert!((cal.counts_per_mm - 1638.4).abs() < 1e-9);
    /// assert!((cal.rpm_per_mm_per_s - 1.5).abs() < 1e-9);
    /// ```
    pub fn from_pulley(
        encoder_counts: u32,
        pulley_circumference_mm: f64,
        position_limit_mm: f64,
    ) -> Self {
        Self {
            counts_per_mm: encoder_counts as f64 / pulley_circumference_mm,
            rpm_per_mm_per_s: 60.0 / pulley_circumference_mm,
            position_limit_mm,
            direction_sign: 1,
            calibrated: false,
        }
    }

    /// 设置方向（非负为正向，负数为反向）
    pub fn with_direction(mut self, direction: i8) -> Self {
        self.direction_sign = if direction < 0 { -1 } else { 1 };
        self
    }

    /// 标记为已标定（位置范围由驱动器固件保证）
    pub fn with_calibrated(mut self, calibrated: bool) -> Self {
        self.calibrated = calibrated;
        self
    }

    fn sign(&self) -> f64 {
        f64::from(self.direction_sign)
    }

    /// 编码器计数 → 毫米
    pub fn counts_to_mm(&self, counts: i32) -> f64 {
        self.sign() * f64::from(counts) / self.counts_per_mm
    }

    /// 毫米 → 编码器计数（四舍五入）
    pub fn mm_to_counts(&self, mm: f64) -> i32 {
        (self.sign() * mm * self.counts_per_mm).round() as i32
    }

    /// 设备速度 → mm/s
    pub fn velocity_to_mm_s(&self, velocity: i32) -> f64 {
        self.sign() * f64::from(velocity) / self.rpm_per_mm_per_s
    }

    /// mm/s → 设备速度（带方向）
    pub fn mm_s_to_velocity(&self, mm_s: f64) -> i32 {
        (self.sign() * mm_s * self.rpm_per_mm_per_s).round() as i32
    }

    /// mm/s → 速度上限（取绝对值）
    pub fn velocity_limit(&self, mm_s: f64) -> u32 {
        (mm_s.abs() * self.rpm_per_mm_per_s).round() as u32
    }
}

/// 一次轴读数（设备单位）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisReading {
    pub position_counts: i32,
    pub velocity: i32,
}

/// 直线轴
///
/// 所有驱动器错误都会被包装为 [`DriverError::AxisCommunication`] 并原样传播。
pub struct Axis {
    id: AxisId,
    driver: Box<dyn MotorDriver>,
    calibration: AxisCalibration,
}

impl fmt::Debug for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Axis")
            .field("id", &self.id)
            .field("calibration", &self.calibration)
            .finish_non_exhaustive()
    }
}

impl Axis {
    pub fn new(id: AxisId, driver: Box<dyn MotorDriver>, calibration: AxisCalibration) -> Self {
        Self {
            id,
            driver,
            calibration,
        }
    }

    pub fn id(&self) -> AxisId {
        self.id
    }

    pub fn calibration(&self) -> &AxisCalibration {
        &self.calibration
    }

    fn wrap<T>(&self, result: Result<T, MotorError>) -> Result<T, DriverError> {
        result.map_err(|source| DriverError::axis(self.id, source))
    }

    // ==================== 模式 ====================

    pub fn set_torque_mode(&mut self) -> Result<(), DriverError> {
        let result = self.driver.set_mode(MotorMode::Torque);
        self.wrap(result)
    }

    pub fn set_velocity_mode(&mut self) -> Result<(), DriverError> {
        let result = self.driver.set_mode(MotorMode::Velocity);
        self.wrap(result)
    }

    pub fn set_position_mode(&mut self) -> Result<(), DriverError> {
        let result = self.driver.set_mode(MotorMode::Position);
        self.wrap(result)
    }

    // ==================== 限值 ====================

    pub fn set_accel_limit(&mut self, limit: u32) -> Result<(), DriverError> {
        let result = self.driver.set_accel_limit(limit);
        self.wrap(result)
    }

    /// 设置速度上限（设备单位）
    pub fn set_velocity_limit(&mut self, limit: u32) -> Result<(), DriverError> {
        let result = self.driver.set_velocity_limit(limit);
        self.wrap(result)
    }

    /// 加速度放开到最大，速度上限恢复默认值
    pub fn reset_limits(&mut self) -> Result<(), DriverError> {
        self.set_accel_limit(MAX_ACCEL_LIMIT)?;
        self.set_velocity_limit(DEFAULT_VELOCITY_LIMIT)
    }

    // ==================== 目标 ====================

    pub fn set_position(&mut self, counts: i32) -> Result<(), DriverError> {
        let result = self.driver.set_position_target(counts);
        self.wrap(result)
    }

    pub fn set_velocity(&mut self, velocity: i32) -> Result<(), DriverError> {
        let result = self.driver.set_velocity_target(velocity);
        self.wrap(result)
    }

    pub fn set_torque(&mut self, torque: i32) -> Result<(), DriverError> {
        let result = self.driver.set_torque_target(torque);
        self.wrap(result)
    }

    // ==================== 读取 ====================

    pub fn get_position_counts(&mut self) -> Result<i32, DriverError> {
        let result = self.driver.get_position();
        self.wrap(result)
    }

    /// 实际速度（设备单位）
    pub fn get_velocity_counts_per_s(&mut self) -> Result<i32, DriverError> {
        let result = self.driver.get_velocity();
        self.wrap(result)
    }

    /// 一次读取位置和速度
    pub fn read(&mut self) -> Result<AxisReading, DriverError> {
        Ok(AxisReading {
            position_counts: self.get_position_counts()?,
            velocity: self.get_velocity_counts_per_s()?,
        })
    }

    // ==================== 物理单位 ====================

    pub fn get_position_mm(&mut self) -> Result<f64, DriverError> {
        let counts = self.get_position_counts()?;
        Ok(self.calibration.counts_to_mm(counts))
    }

    pub fn get_velocity_mm_s(&mut self) -> Result<f64, DriverError> {
        let velocity = self.get_velocity_counts_per_s()?;
        Ok(self.calibration.velocity_to_mm_s(velocity))
    }

    /// 以给定速度上限移动到目标位置（位置模式）
    pub fn move_position_mm(
        &mut self,
        position_mm: f64,
        velocity_mm_s: f64,
    ) -> Result<(), DriverError> {
        let counts = self.calibration.mm_to_counts(position_mm);
        let limit = self.calibration.velocity_limit(velocity_mm_s);
        trace!(
            "{} move to {:.3} mm ({} counts), velocity limit {}",
            self.id, position_mm, counts, limit
        );

        self.set_position_mode()?;
        self.reset_limits()?;
        self.set_velocity_limit(limit)?;
        self.set_position(counts)
    }

    /// 以给定速度持续运动（速度模式）
    pub fn move_velocity_mm_s(&mut self, velocity_mm_s: f64) -> Result<(), DriverError> {
        let velocity = self.calibration.mm_s_to_velocity(velocity_mm_s);
        trace!("{} velocity {:.3} mm/s ({})", self.id, velocity_mm_s, velocity);

        self.set_velocity_mode()?;
        self.reset_limits()?;
        self.set_velocity(velocity)
    }

    /// 释放保持力矩：力矩模式 + 零力矩
    pub fn release(&mut self) -> Result<(), DriverError> {
        self.set_torque_mode()?;
        self.set_torque(0)
    }
}
