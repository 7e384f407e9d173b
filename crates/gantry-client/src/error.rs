//! 客户端层错误类型定义

use gantry_driver::DriverError;
use thiserror::Error;

/// 轨迹执行错误
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// 轴通讯失败（执行已中止，轴已尝试释放）
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 轨迹不合法（未向驱动器发送任何命令）
    #[error("Invalid trajectory: {0}")]
    InvalidTrajectory(String),

    /// 执行被取消
    #[error("Trajectory execution cancelled")]
    Cancelled,

    /// 已有轨迹在执行
    #[error("A trajectory is already executing")]
    AlreadyRunning,
}

impl ExecutorError {
    /// 是否为致命错误（底层硬件故障）
    pub fn is_fatal(&self) -> bool {
        match self {
            ExecutorError::Driver(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// 持久化错误
///
/// 持续记录路径上的持久化错误只记录日志，不会传播给控制流程。
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 后端暂不可用（可重试）
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// 后端拒绝了请求
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// 是否可以在下一个周期重试
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Io(_))
    }
}
