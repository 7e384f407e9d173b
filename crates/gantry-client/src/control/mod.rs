//! 轨迹执行模块
//!
//! - `WaypointExecutor` - 速度上限整形的航点执行器
//! - `Waypoint` / `MeasuredTrajectory` - 输入轨迹与实测轨迹
//! - `CancelToken` - 协作式取消

pub mod cancel;
pub mod executor;
pub mod waypoint;

pub use cancel::CancelToken;
pub use executor::{AtomicExecutorState, ExecutorConfig, ExecutorState, WaypointExecutor};
pub use waypoint::{MeasuredTrajectory, TrajectorySample, Waypoint, validate_waypoints};
