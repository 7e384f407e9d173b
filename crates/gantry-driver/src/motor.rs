//! 电机驱动器能力抽象
//!
//! 寄存器级的驱动器实现（含标定流程）属于外部协作方，本层只依赖 [`MotorDriver`] trait。
//! 所有数值均为设备单位：位置为编码器计数，速度为驱动器速度单位（rpm）。

use crate::error::MotorError;

/// 驱动器控制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MotorMode {
    /// 力矩模式（目标力矩为零时即释放保持力矩）
    #[default]
    Torque,
    /// 速度模式
    Velocity,
    /// 位置模式（驱动器内部梯形轮廓 + PID）
    Position,
}

/// 电机驱动器能力
///
/// 每个方法对应一次驱动器寄存器访问。实现方负责自身的重试策略（如果需要）。
pub trait MotorDriver: Send {
    /// 切换控制模式
    fn set_mode(&mut self, mode: MotorMode) -> Result<(), MotorError>;

    /// 设置加速度上限
    fn set_accel_limit(&mut self, limit: u32) -> Result<(), MotorError>;

    /// 设置速度上限
    fn set_velocity_limit(&mut self, limit: u32) -> Result<(), MotorError>;

    /// 设置目标位置（编码器计数）
    fn set_position_target(&mut self, counts: i32) -> Result<(), MotorError>;

    /// 设置目标速度
    fn set_velocity_target(&mut self, velocity: i32) -> Result<(), MotorError>;

    /// 设置目标力矩（原始单位）
    fn set_torque_target(&mut self, torque: i32) -> Result<(), MotorError>;

    /// 读取实际位置（编码器计数）
    fn get_position(&mut self) -> Result<i32, MotorError>;

    /// 读取实际速度
    fn get_velocity(&mut self) -> Result<i32, MotorError>;
}

impl<T: MotorDriver + ?Sized> MotorDriver for Box<T> {
    fn set_mode(&mut self, mode: MotorMode) -> Result<(), MotorError> {
        (**self).set_mode(mode)
    }

    fn set_accel_limit(&mut self, limit: u32) -> Result<(), MotorError> {
        (**self).set_accel_limit(limit)
    }

    fn set_velocity_limit(&mut self, limit: u32) -> Result<(), MotorError> {
        (**self).set_velocity_limit(limit)
    }

    fn set_position_target(&mut self, counts: i32) -> Result<(), MotorError> {
        (**self).set_position_target(counts)
    }

    fn set_velocity_target(&mut self, velocity: i32) -> Result<(), MotorError> {
        (**self).set_velocity_target(velocity)
    }

    fn set_torque_target(&mut self, torque: i32) -> Result<(), MotorError> {
        (**self).set_torque_target(torque)
    }

    fn get_position(&mut self) -> Result<i32, MotorError> {
        (**self).get_position()
    }

    fn get_velocity(&mut self) -> Result<i32, MotorError> {
        (**self).get_velocity()
    }
}

/// 空驱动器：接受所有命令，始终报告静止在原点
///
/// 用于没有连接电机时运行上层流程。
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMotor;

impl MotorDriver for NullMotor {
    fn set_mode(&mut self, _mode: MotorMode) -> Result<(), MotorError> {
        Ok(())
    }

    fn set_accel_limit(&mut self, _limit: u32) -> Result<(), MotorError> {
        Ok(())
    }

    fn set_velocity_limit(&mut self, _limit: u32) -> Result<(), MotorError> {
        Ok(())
    }

    fn set_position_target(&mut self, _counts: i32) -> Result<(), MotorError> {
        Ok(())
    }

    fn set_velocity_target(&mut self, _velocity: i32) -> Result<(), MotorError> {
        Ok(())
    }

    fn set_torque_target(&mut self, _torque: i32) -> Result<(), MotorError> {
        Ok(())
    }

    fn get_position(&mut self) -> Result<i32, MotorError> {
        Ok(0)
    }

    fn get_velocity(&mut self) -> Result<i32, MotorError> {
        Ok(0)
    }
}
