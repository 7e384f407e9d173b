//! 命令定义和实现

pub mod config;
pub mod execute;
pub mod monitor;

pub use config::ConfigCommand;
pub use execute::ExecuteCommand;
pub use monitor::MonitorCommand;

use anyhow::{Context, Result};
use gantry_client::CraneBuilder;
use gantry_driver::{MachineState, SimulatedMotor};
use gantry_tools::CraneConfig;
use std::path::Path;
use std::sync::Arc;

/// 加载配置，`sensor` 覆盖配置文件中的传感器设备
pub fn load_config(path: Option<&Path>, sensor: Option<&str>) -> Result<CraneConfig> {
    let mut config = match path {
        Some(path) => CraneConfig::load(path)?,
        None => CraneConfig::default(),
    };
    if let Some(device) = sensor {
        config.sensor.device = Some(device.to_string());
    }
    Ok(config)
}

/// 在仿真轴上组装整机
pub fn build_machine(config: &CraneConfig) -> Result<Arc<MachineState>> {
    CraneBuilder::new(config.clone())
        .cart_driver(Box::new(SimulatedMotor::new(config.cart.encoder_counts)))
        .hoist_driver(Box::new(SimulatedMotor::new(config.hoist.encoder_counts)))
        .build()
        .context("Failed to assemble machine")
}
