//! 驱动层错误类型定义

use crate::axis::AxisId;
use thiserror::Error;

/// 电机驱动器传输层错误
///
/// 由 [`MotorDriver`](crate::MotorDriver) 实现返回，描述与单个驱动器通讯时的故障。
#[derive(Error, Debug)]
pub enum MotorError {
    /// 底层 IO 错误（串口、总线等）
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 驱动器未在规定时间内应答
    #[error("Motor response timeout")]
    Timeout,

    /// 驱动器报告的设备错误
    #[error("Device Error: {0}")]
    Device(String),

    /// 驱动器已断开
    #[error("Motor disconnected")]
    Disconnected,
}

impl MotorError {
    /// 是否为致命错误（需要人工介入）
    pub fn is_fatal(&self) -> bool {
        matches!(self, MotorError::Disconnected | MotorError::Device(_))
    }
}

/// 传感器链路错误
///
/// 传感器错误从不终止控制流程：[`SensorChannel`](crate::SensorChannel) 记录日志后沿用上一次读数。
#[derive(Error, Debug)]
pub enum SensorError {
    /// 底层 IO 错误
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 链路已关闭（读取线程退出或发送端被丢弃）
    #[error("Sensor link disconnected")]
    Disconnected,
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 与某个轴的驱动器通讯失败
    ///
    /// 对当前操作是致命的，本层不做重试。
    #[error("Axis communication error ({axis}): {source}")]
    AxisCommunication {
        axis: AxisId,
        #[source]
        source: MotorError,
    },
}

impl DriverError {
    /// 构造轴通讯错误
    pub fn axis(axis: AxisId, source: MotorError) -> Self {
        DriverError::AxisCommunication { axis, source }
    }

    /// 出错的轴
    pub fn axis_id(&self) -> AxisId {
        match self {
            DriverError::AxisCommunication { axis, .. } => *axis,
        }
    }

    /// 是否为致命错误
    ///
    /// 轴通讯错误总会中止当前操作；这里区分的是底层故障是否需要人工介入。
    pub fn is_fatal(&self) -> bool {
        match self {
            DriverError::AxisCommunication { source, .. } => source.is_fatal(),
        }
    }
}
