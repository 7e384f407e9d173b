//! 驱动层模块
//!
//! 本模块提供龙门吊的设备驱动功能，包括：
//! - 电机驱动器能力抽象（[`MotorDriver`]）与直线轴（[`Axis`]）
//! - 传感器链路与帧解码（[`SensorLink`]、[`SensorChannel`]）
//! - 整机一致性快照（[`MachineState`]）
//! - 仿真驱动器（[`SimulatedMotor`]），无硬件时运行完整流程
//!
//! # 使用场景
//!
//! 需要直接操作单个轴或读取原始快照时使用本层。
//! 轨迹执行和持续记录由 `gantry-client` 提供。

pub mod axis;
mod error;
pub mod motor;
pub mod sensor;
pub mod sim;
pub mod state;

pub use axis::{
    Axis, AxisCalibration, AxisId, AxisReading, DEFAULT_VELOCITY_LIMIT, MAX_ACCEL_LIMIT,
};
pub use error::{DriverError, MotorError, SensorError};
pub use motor::{MotorDriver, MotorMode, NullMotor};
pub use sensor::{
    ChannelSensorLink, NullSensorLink, ReaderSensorLink, SensorCalibration, SensorChannel,
    SensorFeed, SensorLink,
};
pub use sim::{MotorCommand, SimulatedMotor};
pub use state::{
    DEFAULT_HOIST_MAX_LENGTH_MM, LogSample, MachineSnapshot, MachineState, rope_length_mm,
};
