//! # Gantry Tools - 配置与共享工具
//!
//! **依赖原则**: 不依赖驱动层和客户端层，只包含纯数据结构和纯函数
//!
//! ## 包含模块
//!
//! - `config` - 整机配置（TOML）
//! - `timestamp` - 时间戳处理（微秒取整、去重）

pub mod config;
pub mod timestamp;

pub use config::{
    AxisConfig, AxisKind, CraneConfig, ExecutorSettings, LoggerSettings, SensorSettings,
};
pub use timestamp::{dedup_keep_first, now_us, round_to_us, secs_to_us};
