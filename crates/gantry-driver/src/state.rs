//! 整机状态
//!
//! [`MachineState`] 独占两个 [`Axis`] 和一个 [`SensorChannel`]，
//! 在同一把锁内完成两轴读取和传感器解码，保证一次快照内部的一致性。
//!
//! 快照之间的顺序没有保证：执行器和后台记录器是互相独立的并发读者。

use crate::axis::{Axis, AxisCalibration, AxisId, AxisReading};
use crate::error::DriverError;
use crate::sensor::{SensorCalibration, SensorChannel};
use gantry_protocol::SensorFrame;
use parking_lot::Mutex;
use tracing::{debug, info};

/// 默认吊绳最大长度（mm）
pub const DEFAULT_HOIST_MAX_LENGTH_MM: f64 = 350.0;

/// 一次整机快照
///
/// 物理量以 mm / mm/s / rad 为单位，同时保留原始读数。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MachineSnapshot {
    pub cart_pos_mm: f64,
    pub cart_vel_mm_s: f64,
    pub hoist_pos_mm: f64,
    pub hoist_vel_mm_s: f64,
    pub angle_rad: f64,
    pub angular_vel_rad_s: f64,
    pub wind_speed: f64,
    /// 剩余绳长，限制在 `[0, hoist_max_length_mm]`
    pub rope_length_mm: f64,
    /// 小车原始读数
    pub cart: AxisReading,
    /// 卷扬原始读数
    pub hoist: AxisReading,
    /// 传感器读数（设备单位，已扣除零点偏移）
    pub sensor: SensorFrame,
}

impl MachineSnapshot {
    /// 转换为带时间戳的记录样本（米制）
    pub fn to_log_sample(&self, timestamp_us: u64) -> LogSample {
        LogSample {
            timestamp_us,
            cart_pos_m: self.cart_pos_mm / 1000.0,
            cart_vel_m_s: self.cart_vel_mm_s / 1000.0,
            hoist_pos_m: self.hoist_pos_mm / 1000.0,
            hoist_vel_m_s: self.hoist_vel_mm_s / 1000.0,
            angle_rad: self.angle_rad,
            angular_vel_rad_s: self.angular_vel_rad_s,
            wind_speed: self.wind_speed,
        }
    }
}

/// 持续记录的单个样本
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogSample {
    /// Unix 时间戳（微秒）
    pub timestamp_us: u64,
    pub cart_pos_m: f64,
    pub cart_vel_m_s: f64,
    pub hoist_pos_m: f64,
    pub hoist_vel_m_s: f64,
    pub angle_rad: f64,
    pub angular_vel_rad_s: f64,
    pub wind_speed: f64,
}

/// 剩余绳长：`max − hoist_pos`，限制在 `[0, max]`
pub fn rope_length_mm(hoist_max_length_mm: f64, hoist_pos_mm: f64) -> f64 {
    let max = hoist_max_length_mm.max(0.0);
    (max - hoist_pos_mm).clamp(0.0, max)
}

struct MachineInner {
    cart: Axis,
    hoist: Axis,
    sensor: SensorChannel,
}

impl MachineInner {
    fn axis_mut(&mut self, id: AxisId) -> &mut Axis {
        match id {
            AxisId::Cart => &mut self.cart,
            AxisId::Hoist => &mut self.hoist,
        }
    }
}

/// 整机状态（线程安全，通常包在 `Arc` 中共享）
///
/// # 示例
///
/// ```rust
/// use gantry_driver::*;
///
/// let cal = AxisCalibration::from_pulley(65536, 40.0, 700.0);
/// let machine = MachineState::new(
///     Axis::new(AxisId::Cart, Box::new(NullMotor), cal),
///     Axis::new(AxisId::Hoist, Box::new(NullMotor), cal.with_direction(-1)),
///     SensorChannel::new(Box::new(NullSensorLink), SensorCalibration::default()),
///     DEFAULT_HOIST_MAX_LENGTH_MM,
/// );
///
/// let snapshot = machine.get_snapshot().unwrap();
/// assert_eq!(snapshot.rope_length_mm, 350.0);
/// ```
pub struct MachineState {
    inner: Mutex<MachineInner>,
    hoist_max_length_mm: f64,
}

impl std::fmt::Debug for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineState")
            .field("hoist_max_length_mm", &self.hoist_max_length_mm)
            .finish_non_exhaustive()
    }
}

impl MachineState {
    pub fn new(cart: Axis, hoist: Axis, sensor: SensorChannel, hoist_max_length_mm: f64) -> Self {
        info!(
            "MachineState created (hoist max length {} mm)",
            hoist_max_length_mm
        );
        Self {
            inner: Mutex::new(MachineInner {
                cart,
                hoist,
                sensor,
            }),
            hoist_max_length_mm,
        }
    }

    pub fn hoist_max_length_mm(&self) -> f64 {
        self.hoist_max_length_mm
    }

    /// 获取一致性快照
    ///
    /// 在一把锁内读取两轴位置/速度并解码最新传感器帧。
    /// 会推进传感器缓冲区。
    pub fn get_snapshot(&self) -> Result<MachineSnapshot, DriverError> {
        let mut inner = self.inner.lock();

        let cart = inner.cart.read()?;
        let hoist = inner.hoist.read()?;
        let sensor = inner.sensor.read();

        let cart_cal = *inner.cart.calibration();
        let hoist_cal = *inner.hoist.calibration();
        let sensor_cal = *inner.sensor.calibration();
        drop(inner);

        let hoist_pos_mm = hoist_cal.counts_to_mm(hoist.position_counts);
        Ok(MachineSnapshot {
            cart_pos_mm: cart_cal.counts_to_mm(cart.position_counts),
            cart_vel_mm_s: cart_cal.velocity_to_mm_s(cart.velocity),
            hoist_pos_mm,
            hoist_vel_mm_s: hoist_cal.velocity_to_mm_s(hoist.velocity),
            angle_rad: sensor_cal.to_radians(sensor.angle),
            angular_vel_rad_s: sensor_cal.to_radians(sensor.angular_velocity),
            wind_speed: f64::from(sensor.wind_speed),
            rope_length_mm: rope_length_mm(self.hoist_max_length_mm, hoist_pos_mm),
            cart,
            hoist,
            sensor,
        })
    }

    /// 在机器锁内对单个轴执行操作
    pub fn with_axis<T>(&self, id: AxisId, f: impl FnOnce(&mut Axis) -> T) -> T {
        let mut inner = self.inner.lock();
        f(inner.axis_mut(id))
    }

    /// 读取某轴的标定参数
    pub fn axis_calibration(&self, id: AxisId) -> AxisCalibration {
        self.with_axis(id, |axis| *axis.calibration())
    }

    /// 传感器角度标定参数
    pub fn sensor_calibration(&self) -> SensorCalibration {
        *self.inner.lock().sensor.calibration()
    }

    pub fn move_cart_position_mm(
        &self,
        position_mm: f64,
        velocity_mm_s: f64,
    ) -> Result<(), DriverError> {
        self.with_axis(AxisId::Cart, |axis| axis.move_position_mm(position_mm, velocity_mm_s))
    }

    pub fn move_hoist_position_mm(
        &self,
        position_mm: f64,
        velocity_mm_s: f64,
    ) -> Result<(), DriverError> {
        self.with_axis(AxisId::Hoist, |axis| axis.move_position_mm(position_mm, velocity_mm_s))
    }

    pub fn move_cart_velocity_mm_s(&self, velocity_mm_s: f64) -> Result<(), DriverError> {
        self.with_axis(AxisId::Cart, |axis| axis.move_velocity_mm_s(velocity_mm_s))
    }

    pub fn move_hoist_velocity_mm_s(&self, velocity_mm_s: f64) -> Result<(), DriverError> {
        self.with_axis(AxisId::Hoist, |axis| axis.move_velocity_mm_s(velocity_mm_s))
    }

    /// 释放两个轴的保持力矩
    ///
    /// 两个轴都会尝试；返回第一个错误。
    pub fn release_all(&self) -> Result<(), DriverError> {
        let mut inner = self.inner.lock();
        let cart = inner.cart.release();
        let hoist = inner.hoist.release();
        debug!("Released both axes");
        cart.and(hoist)
    }

    /// 把当前摆角设为零点
    pub fn zero_angle(&self) {
        self.inner.lock().sensor.zero_angle();
    }

    /// 把当前风速设为零点
    pub fn zero_wind(&self) {
        self.inner.lock().sensor.zero_wind();
    }
}
