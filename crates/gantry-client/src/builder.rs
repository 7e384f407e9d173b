//! 整机 Builder
//!
//! 按 [`CraneConfig`] 组装两个轴和传感器通道，得到共享的 [`MachineState`]。

use crate::control::ExecutorConfig;
use gantry_driver::{
    Axis, AxisCalibration, AxisId, MachineState, MotorDriver, NullMotor, NullSensorLink,
    ReaderSensorLink, SensorCalibration, SensorChannel, SensorError, SensorLink,
};
use gantry_tools::{AxisConfig, AxisKind, CraneConfig, ExecutorSettings, SensorSettings};
use std::sync::Arc;
use tracing::{info, warn};

/// 配置中的轴类型 → 驱动层轴标识
pub fn axis_id(kind: AxisKind) -> AxisId {
    match kind {
        AxisKind::Cart => AxisId::Cart,
        AxisKind::Hoist => AxisId::Hoist,
    }
}

/// 单轴配置 → 标定参数
pub fn axis_calibration(config: &AxisConfig) -> AxisCalibration {
    AxisCalibration::from_pulley(
        config.encoder_counts,
        config.pulley_circumference_mm,
        config.position_limit_mm,
    )
    .with_direction(config.direction)
    .with_calibrated(config.calibrated)
}

/// 传感器配置 → 角度标定
pub fn sensor_calibration(settings: &SensorSettings) -> SensorCalibration {
    SensorCalibration {
        angle_scale: settings.angle_scale,
        invert: settings.invert,
    }
}

impl From<&ExecutorSettings> for ExecutorConfig {
    fn from(settings: &ExecutorSettings) -> Self {
        Self {
            driven_axis: axis_id(settings.driven_axis),
            max_acceleration: settings.max_acceleration,
        }
    }
}

/// 整机 Builder
///
/// 未注入的驱动器使用 [`NullMotor`]；未注入传感器链路时，
/// 若配置了 `sensor.device` 则打开该设备，否则使用 [`NullSensorLink`]。
///
/// # 示例
///
/// ```rust
/// use gantry_client::CraneBuilder;
/// use gantry_driver::SimulatedMotor;
/// use gantry_tools::CraneConfig;
///
/// let machine = CraneBuilder::new(CraneConfig::default())
///     .cart_driver(Box::new(SimulatedMotor::new(65536)))
///     .hoist_driver(Box::new(SimulatedMotor::new(65536)))
///     .build()
///     .unwrap();
/// assert!(machine.get_snapshot().is_ok());
/// ```
pub struct CraneBuilder {
    config: CraneConfig,
    cart: Option<Box<dyn MotorDriver>>,
    hoist: Option<Box<dyn MotorDriver>>,
    sensor: Option<Box<dyn SensorLink>>,
}

impl CraneBuilder {
    pub fn new(config: CraneConfig) -> Self {
        Self {
            config,
            cart: None,
            hoist: None,
            sensor: None,
        }
    }

    /// 小车驱动器
    pub fn cart_driver(mut self, driver: Box<dyn MotorDriver>) -> Self {
        self.cart = Some(driver);
        self
    }

    /// 卷扬驱动器
    pub fn hoist_driver(mut self, driver: Box<dyn MotorDriver>) -> Self {
        self.hoist = Some(driver);
        self
    }

    /// 传感器链路（优先于配置中的 `sensor.device`）
    pub fn sensor_link(mut self, link: Box<dyn SensorLink>) -> Self {
        self.sensor = Some(link);
        self
    }

    pub fn config(&self) -> &CraneConfig {
        &self.config
    }

    /// 组装整机
    ///
    /// 只有打开传感器设备会失败。配置了启动时归零的话，在返回前完成一次归零。
    pub fn build(self) -> Result<Arc<MachineState>, SensorError> {
        let config = self.config;

        let cart = self.cart.unwrap_or_else(|| {
            warn!("No cart driver supplied, using NullMotor");
            Box::new(NullMotor)
        });
        let hoist = self.hoist.unwrap_or_else(|| {
            warn!("No hoist driver supplied, using NullMotor");
            Box::new(NullMotor)
        });

        let link: Box<dyn SensorLink> = match (self.sensor, config.sensor.device.as_deref()) {
            (Some(link), _) => link,
            (None, Some(device)) => Box::new(ReaderSensorLink::open(device)?),
            (None, None) => {
                warn!("No sensor configured, angle and wind readings will stay at zero");
                Box::new(NullSensorLink)
            },
        };

        let machine = Arc::new(MachineState::new(
            Axis::new(AxisId::Cart, cart, axis_calibration(&config.cart)),
            Axis::new(AxisId::Hoist, hoist, axis_calibration(&config.hoist)),
            SensorChannel::new(link, sensor_calibration(&config.sensor)),
            config.hoist_max_length_mm,
        ));

        if config.sensor.zero_angle_on_start {
            machine.zero_angle();
        }
        if config.sensor.zero_wind_on_start {
            machine.zero_wind();
        }

        info!("Gantry '{}' (machine {}) ready", config.machine_name, config.machine_id);
        Ok(machine)
    }
}
