//! 客户端模块
//!
//! 在驱动层之上提供龙门吊的控制流程：
//! - 整机组装（[`CraneBuilder`]）
//! - 航点轨迹执行（[`WaypointExecutor`]）
//! - 后台持续状态记录（[`ContinuousStateLogger`]）
//! - 持久化接口（[`StateSink`]）
//!
//! # 典型流程
//!
//! ```rust,no_run
//! use gantry_client::{
//!     ContinuousStateLogger, CraneBuilder, ExecutorConfig, LoggerConfig, StateLogger,
//!     Waypoint, WaypointExecutor,
//! };
//! use gantry_client::storage::JsonLinesSink;
//! use gantry_tools::CraneConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CraneConfig::load("gantry.toml")?;
//! let machine = CraneBuilder::new(config.clone()).build()?;
//!
//! let mut logger = ContinuousStateLogger::new(
//!     machine.clone(),
//!     Box::new(JsonLinesSink::open("state.jsonl")?),
//!     LoggerConfig::from(&config),
//! );
//! logger.start()?;
//!
//! let executor = WaypointExecutor::new(machine, ExecutorConfig::from(&config.executor));
//! let trajectory = executor.execute_with_logger(
//!     &[
//!         Waypoint::new(0.0, 0.0, 0.0),
//!         Waypoint::new(0.5, 100.0, 200.0),
//!         Waypoint::new(1.0, 200.0, 0.0),
//!     ],
//!     &logger,
//! )?;
//! println!("{} samples", trajectory.len());
//!
//! logger.stop();
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod control;
mod error;
pub mod logger;
pub mod storage;

pub use builder::CraneBuilder;
pub use control::{
    CancelToken, ExecutorConfig, ExecutorState, MeasuredTrajectory, TrajectorySample, Waypoint,
    WaypointExecutor,
};
pub use error::{ExecutorError, StorageError};
pub use logger::{
    ContinuousStateLogger, LoggerConfig, LoggerMetricsSnapshot, NullStateLogger, StateLogger,
};
pub use storage::{CONTINUOUS_RUN_ID, JsonLinesSink, MemorySink, NullSink, StateSink, StoredRow};
