//! execute 命令
//!
//! 在仿真轴上执行航点轨迹。执行期间暂停持续记录，Ctrl-C 取消执行。

use anyhow::{Context, Result};
use clap::Args;
use gantry_client::storage::{JsonLinesSink, NullSink, StateSink};
use gantry_client::{
    ContinuousStateLogger, ExecutorConfig, LoggerConfig, MeasuredTrajectory, StateLogger,
    Waypoint, WaypointExecutor,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 轨迹执行命令参数
#[derive(Args, Debug)]
pub struct ExecuteCommand {
    /// 配置文件（TOML）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 航点文件（JSON 数组，每项含 t / x / v）
    #[arg(short, long)]
    pub waypoints: PathBuf,

    /// 持续状态记录文件（JSON Lines），省略时不持久化
    #[arg(long)]
    pub state_log: Option<PathBuf>,

    /// 实测轨迹输出文件（JSON），省略时只打印摘要
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 传感器设备（覆盖配置）
    #[arg(short, long)]
    pub sensor: Option<String>,
}

/// 读取航点文件
pub fn load_waypoints(path: &Path) -> Result<Vec<Waypoint>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read waypoints {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid waypoints file {}", path.display()))
}

impl ExecuteCommand {
    pub fn execute(&self) -> Result<()> {
        let config = super::load_config(self.config.as_deref(), self.sensor.as_deref())?;
        let waypoints = load_waypoints(&self.waypoints)?;
        let machine = super::build_machine(&config)?;

        let sink: Box<dyn StateSink> = match &self.state_log {
            Some(path) => Box::new(JsonLinesSink::open(path)?),
            None => Box::new(NullSink),
        };

        let mut logger: Box<dyn StateLogger> = if config.logger.enabled {
            Box::new(ContinuousStateLogger::new(
                machine.clone(),
                sink,
                LoggerConfig::from(&config),
            ))
        } else {
            Box::new(gantry_client::NullStateLogger)
        };
        logger.start().context("Failed to start continuous logger")?;

        let executor = WaypointExecutor::new(machine, ExecutorConfig::from(&config.executor));
        let token = executor.cancel_token();
        ctrlc::set_handler(move || {
            eprintln!("\nReceived interrupt signal. Cancelling trajectory...");
            token.cancel();
        })
        .context("Failed to install Ctrl-C handler")?;

        let result = executor.execute_with_logger(&waypoints, logger.as_ref());
        logger.stop();

        let trajectory = result?;
        self.report(&trajectory)
    }

    fn report(&self, trajectory: &MeasuredTrajectory) -> Result<()> {
        println!("📊 Trajectory complete");
        println!("  Samples:        {}", trajectory.len());
        println!("  Duration:       {:.6} s", trajectory.duration());
        if let Some(x) = trajectory.final_position_m() {
            println!("  Final position: {:.4} m", x);
        }

        match &self.output {
            Some(path) => {
                let json = serde_json::to_string_pretty(trajectory)?;
                fs::write(path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Measured trajectory written to {}", path.display());
            },
            None => warn!("No --output given, measured trajectory not saved"),
        }
        Ok(())
    }
}
